use ndarray::Array2;
use serde::Deserialize;

use super::pipeline::{Step, TableEncoder};
use super::registry::parse_params;
use crate::frame::{Frame, Value};
use crate::utils::AnalysisError;

/// Numeric passthrough column, optionally imputing missing cells
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumericColumn {
    Name(String),
    Detailed {
        column: String,
        #[serde(default)]
        fill: Option<f64>,
    },
}

impl NumericColumn {
    fn column(&self) -> &str {
        match self {
            NumericColumn::Name(name) => name,
            NumericColumn::Detailed { column, .. } => column,
        }
    }

    fn fill(&self) -> Option<f64> {
        match self {
            NumericColumn::Name(_) => None,
            NumericColumn::Detailed { fill, .. } => *fill,
        }
    }
}

/// One-hot encoded column; unknown and missing values encode as all zeros
#[derive(Debug, Clone, Deserialize)]
pub struct CategoricalColumn {
    pub column: String,
    pub categories: Vec<String>,
}

/// Encodes a table as `[numeric columns..., one-hot blocks...]`
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnEncoder {
    #[serde(default)]
    pub numeric: Vec<NumericColumn>,
    #[serde(default)]
    pub categorical: Vec<CategoricalColumn>,
}

impl ColumnEncoder {
    pub const NAME: &'static str = "ColumnEncoder";

    pub fn from_params(params: &serde_json::Value) -> Result<Step, AnalysisError> {
        let encoder: ColumnEncoder = parse_params(Self::NAME, params)?;
        if encoder.n_features_out() == 0 {
            return Err(AnalysisError::ArtifactError(format!(
                "{} must produce at least one feature",
                Self::NAME
            )));
        }
        Ok(Step::Encode(Box::new(encoder)))
    }
}

impl TableEncoder for ColumnEncoder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn n_features_out(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.categories.len()).sum::<usize>()
    }

    fn encode(&self, frame: &Frame) -> Result<Array2<f64>, AnalysisError> {
        let mut features = Array2::<f64>::zeros((frame.n_rows(), self.n_features_out()));
        let mut offset = 0;

        for spec in &self.numeric {
            let column = frame.require_column(spec.column())?;
            for (row, value) in column.values.iter().enumerate() {
                features[[row, offset]] = match value {
                    Value::Missing => spec.fill().unwrap_or(f64::NAN),
                    Value::Text(raw) => {
                        return Err(AnalysisError::SchemaError(format!(
                            "column '{}' has non-numeric value '{}' at row {}",
                            spec.column(),
                            raw,
                            row
                        )))
                    }
                    numeric => numeric.as_f64().unwrap_or(f64::NAN),
                };
            }
            offset += 1;
        }

        for spec in &self.categorical {
            let column = frame.require_column(&spec.column)?;
            for (row, value) in column.values.iter().enumerate() {
                let hit = value
                    .category_label()
                    .and_then(|label| spec.categories.iter().position(|c| *c == label));
                if let Some(pos) = hit {
                    features[[row, offset + pos]] = 1.0;
                }
            }
            offset += spec.categories.len();
        }

        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn encoder() -> ColumnEncoder {
        serde_json::from_value(json!({
            "numeric": ["DMBTR", {"column": "WRBTR", "fill": 0.0}],
            "categorical": [{"column": "BLART", "categories": ["SA", "KR"]}]
        }))
        .unwrap()
    }

    fn frame(rows: serde_json::Value) -> Frame {
        let records: Vec<Map<String, serde_json::Value>> = serde_json::from_value(rows).unwrap();
        Frame::from_records(&records)
    }

    #[test]
    fn test_encode_layout() {
        let frame = frame(json!([
            {"DMBTR": 10, "WRBTR": 2.5, "BLART": "KR"},
            {"DMBTR": 20, "WRBTR": null, "BLART": "ZZ"}
        ]));
        let features = encoder().encode(&frame).unwrap();

        assert_eq!(features.dim(), (2, 4));
        assert_eq!(features.row(0).to_vec(), vec![10.0, 2.5, 0.0, 1.0]);
        // fill applies to WRBTR, unknown category encodes as zeros
        assert_eq!(features.row(1).to_vec(), vec![20.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_without_fill_is_nan() {
        let frame = frame(json!([{"DMBTR": null, "WRBTR": 1, "BLART": "SA"}]));
        let features = encoder().encode(&frame).unwrap();
        assert!(features[[0, 0]].is_nan());
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let frame = frame(json!([{"DMBTR": 1, "BLART": "SA"}]));
        let err = encoder().encode(&frame).unwrap_err();
        assert_eq!(err, AnalysisError::SchemaError("column 'WRBTR' not found".to_string()));
    }

    #[test]
    fn test_text_in_numeric_column() {
        let frame = frame(json!([{"DMBTR": "abc", "WRBTR": 1, "BLART": "SA"}]));
        let err = encoder().encode(&frame).unwrap_err();
        assert!(err.to_string().contains("non-numeric value 'abc'"));
    }

    #[test]
    fn test_numeric_categories_match_labels() {
        let encoder: ColumnEncoder = serde_json::from_value(json!({
            "categorical": [{"column": "BUKRS", "categories": ["1000", "2000"]}]
        }))
        .unwrap();
        let frame = frame(json!([{"BUKRS": 2000}, {"BUKRS": "1000"}]));
        let features = encoder.encode(&frame).unwrap();
        assert_eq!(features.row(0).to_vec(), vec![0.0, 1.0]);
        assert_eq!(features.row(1).to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_float_categories_keep_decimal_point() {
        let encoder: ColumnEncoder = serde_json::from_value(json!({
            "categorical": [{"column": "RATE", "categories": ["1.0", "2.0", "2.5"]}]
        }))
        .unwrap();
        let frame = frame(json!([{"RATE": 2.0}, {"RATE": 2.5}, {"RATE": 1}]));
        let features = encoder.encode(&frame).unwrap();
        assert_eq!(features.row(0).to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(features.row(1).to_vec(), vec![0.0, 0.0, 1.0]);
        // integer cells label as "1" and do not match "1.0"
        assert_eq!(features.row(2).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_from_params_requires_features() {
        assert!(ColumnEncoder::from_params(&json!({})).is_err());
        let step = ColumnEncoder::from_params(&json!({"numeric": ["a"]})).unwrap();
        assert_eq!(step.name(), "ColumnEncoder");
    }
}
