//! Pre-trained scoring model: feature pipeline plus outlier scorer
//!
//! The artifact is a JSON document in one of two shapes:
//!
//! * split: `{"feature_pipe": {"steps": [...]}, "lof": {"type": ..., "params": ...}}`
//! * combined: `{"pipeline": {"steps": [..., <scoring step>]}}`
//!
//! Step names are resolved through a [`StepRegistry`] before any step is built.

pub mod columns;
pub mod decomposition;
pub mod encoder;
pub mod feature;
pub mod knn_kdtree;
pub mod lof;
pub mod pipeline;
pub mod registry;
pub mod scaling;

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::utils::AnalysisError;

pub use pipeline::{FeaturePipeline, OutlierScorer, Step};
pub use registry::{StepRegistry, StepSpec};

#[derive(Debug, Deserialize)]
struct PipelineSpec {
    steps: Vec<StepSpec>,
}

#[derive(Debug, Deserialize)]
struct ArtifactDocument {
    #[serde(default)]
    feature_pipe: Option<PipelineSpec>,
    #[serde(default)]
    lof: Option<StepSpec>,
    #[serde(default)]
    pipeline: Option<PipelineSpec>,
}

/// Which artifact layout the bundle was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleShape {
    Split,
    Combined,
}

/// Description of a loaded bundle for health checks and the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub shape: BundleShape,
    pub steps: Vec<String>,
    pub scorer: String,
    pub n_features: usize,
    pub n_neighbors: usize,
    pub n_train: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Immutable model shared by every request
#[derive(Debug)]
pub struct ModelBundle {
    pipeline: FeaturePipeline,
    scorer: Box<dyn OutlierScorer>,
    shape: BundleShape,
    source: Option<PathBuf>,
}

impl ModelBundle {
    /// Pair a feature pipeline with a scorer fitted on its output
    pub fn new(pipeline: FeaturePipeline, scorer: Box<dyn OutlierScorer>) -> Result<Self, AnalysisError> {
        Self::assemble(pipeline, scorer, BundleShape::Split)
    }

    fn assemble(
        pipeline: FeaturePipeline,
        scorer: Box<dyn OutlierScorer>,
        shape: BundleShape,
    ) -> Result<Self, AnalysisError> {
        if pipeline.n_features_out() != scorer.n_features_in() {
            return Err(AnalysisError::ArtifactError(format!(
                "feature pipeline produces {} features but {} was fitted on {}",
                pipeline.n_features_out(),
                scorer.name(),
                scorer.n_features_in()
            )));
        }
        Ok(Self {
            pipeline,
            scorer,
            shape,
            source: None,
        })
    }

    /// Load and resolve an artifact file
    pub fn load(path: impl AsRef<Path>, registry: &StepRegistry) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            AnalysisError::ArtifactError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut bundle = Self::from_slice(&bytes, registry)?;
        bundle.source = Some(path.to_path_buf());
        Ok(bundle)
    }

    pub fn from_slice(bytes: &[u8], registry: &StepRegistry) -> Result<Self, AnalysisError> {
        let document: ArtifactDocument = serde_json::from_slice(bytes)
            .map_err(|e| AnalysisError::ArtifactError(format!("malformed artifact: {}", e)))?;
        Self::from_document(document, registry)
    }

    pub fn from_value(value: serde_json::Value, registry: &StepRegistry) -> Result<Self, AnalysisError> {
        let document: ArtifactDocument = serde_json::from_value(value)
            .map_err(|e| AnalysisError::ArtifactError(format!("malformed artifact: {}", e)))?;
        Self::from_document(document, registry)
    }

    fn from_document(document: ArtifactDocument, registry: &StepRegistry) -> Result<Self, AnalysisError> {
        match document {
            ArtifactDocument {
                feature_pipe: Some(feature_pipe),
                lof: Some(lof),
                pipeline: None,
            } => {
                let steps = build_steps(&feature_pipe.steps, registry)?;
                let pipeline = FeaturePipeline::from_steps(steps)?;
                let scorer = match registry.build(&lof)? {
                    Step::Score(scorer) => scorer,
                    other => {
                        return Err(AnalysisError::ArtifactError(format!(
                            "lof entry ({}) does not support score_samples",
                            other.name()
                        )))
                    }
                };
                Self::assemble(pipeline, scorer, BundleShape::Split)
            }
            ArtifactDocument {
                feature_pipe: None,
                lof: None,
                pipeline: Some(combined),
            } => {
                let mut steps = build_steps(&combined.steps, registry)?;
                let scorer = match steps.pop() {
                    Some(Step::Score(scorer)) => scorer,
                    Some(other) => {
                        return Err(AnalysisError::ArtifactError(format!(
                            "final pipeline step ({}) does not support score_samples",
                            other.name()
                        )))
                    }
                    None => {
                        return Err(AnalysisError::ArtifactError(
                            "pipeline has no steps".to_string(),
                        ))
                    }
                };
                let pipeline = FeaturePipeline::from_steps(steps)?;
                Self::assemble(pipeline, scorer, BundleShape::Combined)
            }
            _ => Err(AnalysisError::ArtifactError(
                "artifact must contain either feature_pipe and lof, or pipeline".to_string(),
            )),
        }
    }

    /// Feature-transformation stage
    pub fn transform(&self, frame: &Frame) -> Result<Array2<f64>, AnalysisError> {
        self.pipeline.transform(frame)
    }

    /// Raw scorer output; lower is more anomalous
    pub fn score_samples(&self, features: &Array2<f64>) -> Result<Vec<f64>, AnalysisError> {
        self.scorer.score_samples(features)
    }

    /// Transform then score, negated so that higher is more anomalous
    pub fn anomaly_scores(&self, frame: &Frame) -> Result<Vec<f64>, AnalysisError> {
        let features = self.transform(frame)?;
        let raw = self.score_samples(&features)?;
        Ok(raw.into_iter().map(|s| -s).collect())
    }

    pub fn shape(&self) -> BundleShape {
        self.shape
    }

    pub fn summary(&self) -> ModelSummary {
        let info = self.scorer.describe();
        ModelSummary {
            shape: self.shape,
            steps: self.pipeline.step_names().into_iter().map(String::from).collect(),
            scorer: self.scorer.name().to_string(),
            n_features: self.scorer.n_features_in(),
            n_neighbors: info.n_neighbors,
            n_train: info.n_train,
            source: self.source.as_ref().map(|p| p.display().to_string()),
        }
    }
}

fn build_steps(specs: &[StepSpec], registry: &StepRegistry) -> Result<Vec<Step>, AnalysisError> {
    specs.iter().map(|spec| registry.build(spec)).collect()
}
