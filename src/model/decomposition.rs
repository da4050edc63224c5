use ndarray::Array2;
use serde::Deserialize;

use super::feature::{check_width, rows_to_matrix};
use super::pipeline::{MatrixTransform, Step};
use super::registry::parse_params;
use crate::utils::AnalysisError;

#[derive(Debug, Deserialize)]
struct TruncatedSvdParams {
    /// `n_components x n_features`
    components: Vec<Vec<f64>>,
}

/// Projection onto fitted SVD components: `X · componentsᵀ`
#[derive(Debug, Clone, PartialEq)]
pub struct TruncatedSvd {
    components: Array2<f64>,
}

impl TruncatedSvd {
    pub const NAME: &'static str = "TruncatedSVD";

    pub fn new(components: Array2<f64>) -> Result<Self, AnalysisError> {
        if components.nrows() == 0 || components.ncols() == 0 {
            return Err(AnalysisError::ArtifactError(format!(
                "{} needs at least one component over at least one feature",
                Self::NAME
            )));
        }
        if components.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::ArtifactError(format!(
                "{} components contain NaN or Inf values",
                Self::NAME
            )));
        }
        Ok(Self { components })
    }

    pub fn from_params(params: &serde_json::Value) -> Result<Step, AnalysisError> {
        let p: TruncatedSvdParams = parse_params(Self::NAME, params)?;
        let components = rows_to_matrix(&p.components, "TruncatedSVD components")?;
        Ok(Step::Matrix(Box::new(Self::new(components)?)))
    }
}

impl MatrixTransform for TruncatedSvd {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn n_features_in(&self) -> usize {
        self.components.ncols()
    }

    fn n_features_out(&self) -> usize {
        self.components.nrows()
    }

    fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>, AnalysisError> {
        check_width(features, self.components.ncols(), Self::NAME)?;
        Ok(features.dot(&self.components.t()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use serde_json::json;

    #[test]
    fn test_projection() {
        let svd = TruncatedSvd::new(arr2(&[[1.0, 0.0, 0.0], [0.0, 0.5, 0.5]])).unwrap();
        let projected = svd.transform(&arr2(&[[3.0, 2.0, 4.0]])).unwrap();

        assert_eq!(projected, arr2(&[[3.0, 3.0]]));
        assert_eq!(svd.n_features_in(), 3);
        assert_eq!(svd.n_features_out(), 2);
    }

    #[test]
    fn test_width_mismatch() {
        let svd = TruncatedSvd::new(arr2(&[[1.0, 0.0]])).unwrap();
        let err = svd.transform(&arr2(&[[1.0, 2.0, 3.0]])).unwrap_err();
        assert!(err.to_string().contains("TruncatedSVD expects 2 features, got 3"));
    }

    #[test]
    fn test_from_params() {
        assert!(TruncatedSvd::from_params(&json!({"components": [[1.0, 0.0], [0.0, 1.0]]})).is_ok());
        assert!(TruncatedSvd::from_params(&json!({"components": [[1.0, 0.0], [0.0]]})).is_err());
        assert!(TruncatedSvd::from_params(&json!({"components": []})).is_err());
    }
}
