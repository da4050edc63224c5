//! Feature pipeline: table steps, one encoder, then matrix steps

use std::fmt;

use ndarray::Array2;

use crate::frame::Frame;
use crate::utils::AnalysisError;

/// Table to table step (column dropping, per-column transforms)
pub trait TableTransform: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn transform(&self, frame: Frame) -> Result<Frame, AnalysisError>;
}

/// Table to numeric matrix step
pub trait TableEncoder: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Number of matrix columns produced
    fn n_features_out(&self) -> usize;

    fn encode(&self, frame: &Frame) -> Result<Array2<f64>, AnalysisError>;
}

/// Matrix to matrix step (scaling, projection)
pub trait MatrixTransform: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn n_features_in(&self) -> usize;

    fn n_features_out(&self) -> usize;

    fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>, AnalysisError>;
}

/// Scoring stage; raw scores are lower for more anomalous rows
pub trait OutlierScorer: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn n_features_in(&self) -> usize;

    /// Number of fitted neighbors and training points, for summaries
    fn describe(&self) -> ScorerInfo;

    fn score_samples(&self, features: &Array2<f64>) -> Result<Vec<f64>, AnalysisError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScorerInfo {
    pub n_neighbors: usize,
    pub n_train: usize,
}

/// A constructed pipeline step
#[derive(Debug)]
pub enum Step {
    Table(Box<dyn TableTransform>),
    Encode(Box<dyn TableEncoder>),
    Matrix(Box<dyn MatrixTransform>),
    Score(Box<dyn OutlierScorer>),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Table(s) => s.name(),
            Step::Encode(s) => s.name(),
            Step::Matrix(s) => s.name(),
            Step::Score(s) => s.name(),
        }
    }
}

/// Fitted feature-transformation stage
#[derive(Debug)]
pub struct FeaturePipeline {
    table_steps: Vec<Box<dyn TableTransform>>,
    encoder: Box<dyn TableEncoder>,
    matrix_steps: Vec<Box<dyn MatrixTransform>>,
}

impl FeaturePipeline {
    /// Assemble a pipeline, checking step order and matrix widths
    pub fn from_steps(steps: Vec<Step>) -> Result<Self, AnalysisError> {
        let mut table_steps = Vec::new();
        let mut encoder: Option<Box<dyn TableEncoder>> = None;
        let mut matrix_steps: Vec<Box<dyn MatrixTransform>> = Vec::new();

        for (pos, step) in steps.into_iter().enumerate() {
            match step {
                Step::Table(s) if encoder.is_none() => table_steps.push(s),
                Step::Encode(s) if encoder.is_none() => encoder = Some(s),
                Step::Matrix(s) if encoder.is_some() => {
                    let width = matrix_steps
                        .last()
                        .map(|m| m.n_features_out())
                        .or_else(|| encoder.as_ref().map(|e| e.n_features_out()))
                        .unwrap_or(0);
                    if s.n_features_in() != width {
                        return Err(AnalysisError::ArtifactError(format!(
                            "step {} ({}) expects {} features but receives {}",
                            pos,
                            s.name(),
                            s.n_features_in(),
                            width
                        )));
                    }
                    matrix_steps.push(s);
                }
                other => {
                    return Err(AnalysisError::ArtifactError(format!(
                        "step {} ({}) is out of place in the feature pipeline",
                        pos,
                        other.name()
                    )))
                }
            }
        }

        let encoder = encoder.ok_or_else(|| {
            AnalysisError::ArtifactError(
                "feature pipeline needs a step that encodes the table as a matrix".to_string(),
            )
        })?;

        Ok(Self {
            table_steps,
            encoder,
            matrix_steps,
        })
    }

    /// Map a table to the numeric matrix the scorer was fitted on
    pub fn transform(&self, frame: &Frame) -> Result<Array2<f64>, AnalysisError> {
        let encoded = if self.table_steps.is_empty() {
            self.encoder.encode(frame)?
        } else {
            let mut current = frame.clone();
            for step in &self.table_steps {
                current = step.transform(current)?;
            }
            self.encoder.encode(&current)?
        };

        self.matrix_steps
            .iter()
            .try_fold(encoded, |features, step| step.transform(&features))
    }

    pub fn n_features_out(&self) -> usize {
        self.matrix_steps
            .last()
            .map(|m| m.n_features_out())
            .unwrap_or_else(|| self.encoder.n_features_out())
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.table_steps.iter().map(|s| s.name()).collect();
        names.push(self.encoder.name());
        names.extend(self.matrix_steps.iter().map(|s| s.name()));
        names
    }
}
