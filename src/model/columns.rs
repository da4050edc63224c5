//! Table-level helper transforms referenced by name from model artifacts

use serde::Deserialize;

use super::pipeline::{Step, TableTransform};
use super::registry::parse_params;
use crate::frame::{Frame, Value};
use crate::utils::AnalysisError;

/// Removes the named columns; absent columns are ignored
#[derive(Debug, Clone, Deserialize)]
pub struct DropColumns {
    pub columns: Vec<String>,
}

impl DropColumns {
    pub const NAME: &'static str = "DropColumns";

    pub fn from_params(params: &serde_json::Value) -> Result<Step, AnalysisError> {
        let step: DropColumns = parse_params(Self::NAME, params)?;
        Ok(Step::Table(Box::new(step)))
    }
}

impl TableTransform for DropColumns {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn transform(&self, mut frame: Frame) -> Result<Frame, AnalysisError> {
        for column in &self.columns {
            frame.drop_column(column);
        }
        Ok(frame)
    }
}

fn default_eps() -> f64 {
    1e-6
}

/// Natural log of `x + eps` on numeric columns
#[derive(Debug, Clone, Deserialize)]
pub struct LogEps {
    pub columns: Vec<String>,
    #[serde(default = "default_eps")]
    pub eps: f64,
}

impl LogEps {
    pub const NAME: &'static str = "log_eps";

    pub fn from_params(params: &serde_json::Value) -> Result<Step, AnalysisError> {
        let step: LogEps = parse_params(Self::NAME, params)?;
        if !step.eps.is_finite() || step.eps < 0.0 {
            return Err(AnalysisError::ArtifactError(format!(
                "{}: eps must be a non-negative number, got {}",
                Self::NAME,
                step.eps
            )));
        }
        Ok(Step::Table(Box::new(step)))
    }
}

impl TableTransform for LogEps {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn transform(&self, mut frame: Frame) -> Result<Frame, AnalysisError> {
        for name in &self.columns {
            let column = frame
                .column_mut(name)
                .ok_or_else(|| AnalysisError::SchemaError(format!("column '{}' not found", name)))?;

            for (row, value) in column.values.iter_mut().enumerate() {
                let next = match &*value {
                    Value::Missing => Value::Missing,
                    Value::Text(raw) => {
                        return Err(AnalysisError::SchemaError(format!(
                            "column '{}' has non-numeric value '{}' at row {}",
                            name, raw, row
                        )))
                    }
                    numeric => match numeric.as_f64() {
                        Some(x) => Value::Float((x + self.eps).ln()),
                        None => Value::Missing,
                    },
                };
                *value = next;
            }
        }
        Ok(frame)
    }
}
