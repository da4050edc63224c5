//! Name -> constructor table used to resolve artifact steps
//!
//! Artifacts refer to their steps by the names they were saved under.
//! Every name must be registered before the artifact is loaded; callers
//! can add aliases for artifacts that use different names.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::columns::{DropColumns, LogEps};
use super::decomposition::TruncatedSvd;
use super::encoder::ColumnEncoder;
use super::lof::LocalOutlierFactor;
use super::pipeline::Step;
use super::scaling::StandardScaler;
use crate::utils::AnalysisError;

/// Builds a step from its `params` object
pub type StepConstructor = fn(&serde_json::Value) -> Result<Step, AnalysisError>;

/// One step entry as it appears in an artifact
#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Clone, Default)]
pub struct StepRegistry {
    constructors: BTreeMap<String, StepConstructor>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

impl StepRegistry {
    /// Registry with no names at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in step
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register(DropColumns::NAME, DropColumns::from_params)
            .register(LogEps::NAME, LogEps::from_params)
            .register(ColumnEncoder::NAME, ColumnEncoder::from_params)
            .register(StandardScaler::NAME, StandardScaler::from_params)
            .register(TruncatedSvd::NAME, TruncatedSvd::from_params)
            .register(LocalOutlierFactor::NAME, LocalOutlierFactor::from_params);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, constructor: StepConstructor) -> &mut Self {
        self.constructors.insert(name.into(), constructor);
        self
    }

    /// Make `alias` resolve to the constructor already registered as `target`
    pub fn alias(&mut self, alias: impl Into<String>, target: &str) -> Result<&mut Self, AnalysisError> {
        let constructor = *self.constructors.get(target).ok_or_else(|| {
            AnalysisError::ArtifactError(format!("cannot alias unknown step type '{}'", target))
        })?;
        Ok(self.register(alias, constructor))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn build(&self, spec: &StepSpec) -> Result<Step, AnalysisError> {
        let constructor = self.constructors.get(&spec.kind).ok_or_else(|| {
            AnalysisError::ArtifactError(format!(
                "unknown step type '{}' (registered: {})",
                spec.kind,
                self.names().join(", ")
            ))
        })?;
        constructor(&spec.params)
    }
}

/// Deserialize a step's params, naming the step in the error
pub(crate) fn parse_params<T: DeserializeOwned>(
    step: &str,
    params: &serde_json::Value,
) -> Result<T, AnalysisError> {
    T::deserialize(params)
        .map_err(|e| AnalysisError::ArtifactError(format!("invalid params for {}: {}", step, e)))
}
