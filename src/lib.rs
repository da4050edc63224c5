//! Anomaly Scoring - HTTP service around a pre-trained SVD + LOF model
//!
//! The model bundle is loaded once at startup, shared read-only by every
//! request, and used to rank JSON records or CSV uploads by how anomalous
//! each row is.

pub mod api;
pub mod config;
pub mod frame;
pub mod model;
pub mod ranking;
pub mod service;
pub mod utils;

pub use frame::{Column, Frame, Value};
pub use model::{ModelBundle, ModelSummary, StepRegistry};
pub use service::{CsvScores, ScoringService, ScoringSettings, TopKResult};
pub use utils::AnalysisError;
