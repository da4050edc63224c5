use ndarray::{Array1, Array2};
use serde::Deserialize;

use super::feature::check_width;
use super::pipeline::{MatrixTransform, Step};
use super::registry::parse_params;
use crate::utils::AnalysisError;

#[derive(Debug, Deserialize)]
struct StandardScalerParams {
    #[serde(default)]
    mean: Option<Vec<f64>>,
    #[serde(default)]
    scale: Option<Vec<f64>>,
}

/// Standard scaling with fitted statistics: (x - mean) / scale
///
/// # Note
/// Zero scale entries (constant training columns) divide by 1.0, so the
/// column is only centered.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
    width: usize,
}

impl StandardScaler {
    pub const NAME: &'static str = "StandardScaler";

    pub fn new(mean: Option<Vec<f64>>, scale: Option<Vec<f64>>) -> Result<Self, AnalysisError> {
        let width = match (&mean, &scale) {
            (Some(m), Some(s)) if m.len() != s.len() => {
                return Err(AnalysisError::ArtifactError(format!(
                    "{}: mean has {} entries but scale has {}",
                    Self::NAME,
                    m.len(),
                    s.len()
                )))
            }
            (Some(m), _) => m.len(),
            (None, Some(s)) => s.len(),
            (None, None) => {
                return Err(AnalysisError::ArtifactError(format!(
                    "{} needs mean, scale or both",
                    Self::NAME
                )))
            }
        };

        let scale = scale.map(|s| {
            s.into_iter()
                .map(|v| if v.abs() < f64::EPSILON { 1.0 } else { v })
                .collect::<Array1<f64>>()
        });

        Ok(Self {
            mean: mean.map(Array1::from),
            scale,
            width,
        })
    }

    pub fn from_params(params: &serde_json::Value) -> Result<Step, AnalysisError> {
        let p: StandardScalerParams = parse_params(Self::NAME, params)?;
        Ok(Step::Matrix(Box::new(Self::new(p.mean, p.scale)?)))
    }
}

impl MatrixTransform for StandardScaler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn n_features_in(&self) -> usize {
        self.width
    }

    fn n_features_out(&self) -> usize {
        self.width
    }

    fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>, AnalysisError> {
        check_width(features, self.width, Self::NAME)?;
        let mut scaled = features.clone();
        if let Some(mean) = &self.mean {
            scaled -= mean;
        }
        if let Some(scale) = &self.scale {
            scaled /= scale;
        }
        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use serde_json::json;

    #[test]
    fn test_standard_scale_fitted() {
        let scaler = StandardScaler::new(Some(vec![2.0, 20.0]), Some(vec![0.5, 10.0])).unwrap();
        let scaled = scaler.transform(&arr2(&[[1.0, 10.0], [3.0, 40.0]])).unwrap();

        assert_eq!(scaled, arr2(&[[-2.0, -1.0], [2.0, 2.0]]));
    }

    #[test]
    fn test_zero_scale_only_centers() {
        let scaler = StandardScaler::new(Some(vec![5.0]), Some(vec![0.0])).unwrap();
        let scaled = scaler.transform(&arr2(&[[5.0], [7.0]])).unwrap();

        assert_eq!(scaled, arr2(&[[0.0], [2.0]]));
    }

    #[test]
    fn test_mean_only() {
        let scaler = StandardScaler::new(Some(vec![1.0, 1.0]), None).unwrap();
        let scaled = scaler.transform(&arr2(&[[1.0, 3.0]])).unwrap();
        assert_eq!(scaled, arr2(&[[0.0, 2.0]]));
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = StandardScaler::new(Some(vec![0.0, 0.0]), Some(vec![1.0, 1.0])).unwrap();
        assert!(matches!(
            scaler.transform(&arr2(&[[1.0, 2.0, 3.0]])),
            Err(AnalysisError::SchemaError(_))
        ));
    }

    #[test]
    fn test_invalid_params() {
        assert!(StandardScaler::new(None, None).is_err());
        assert!(StandardScaler::new(Some(vec![0.0]), Some(vec![1.0, 2.0])).is_err());
        assert!(StandardScaler::from_params(&json!({"mean": [0.0], "scale": [1.0]})).is_ok());
    }
}
