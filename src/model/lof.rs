//! Local Outlier Factor in novelty mode
//!
//! Query rows are compared against the fitted training points:
//! `lrd(x) = 1 / (mean(max(d(x, o), k_distance(o))) + 1e-10)` over the
//! k nearest training points `o`, and the raw score is
//! `-mean(lrd(o) / lrd(x))`. Lower raw scores are more anomalous.

use ndarray::{Array1, Array2, ArrayView1};
use serde::Deserialize;

use super::feature::{check_width, rows_to_matrix, validate_fitted_points};
use super::knn_kdtree::{build_index, KnnSearch, Neighbor};
use super::pipeline::{OutlierScorer, ScorerInfo, Step};
use super::registry::parse_params;
use crate::utils::AnalysisError;

const LRD_EPS: f64 = 1e-10;

#[derive(Debug, Deserialize)]
struct LofParams {
    n_neighbors: usize,
    training: Vec<Vec<f64>>,
    #[serde(default)]
    k_distances: Option<Vec<f64>>,
    #[serde(default)]
    lrd: Option<Vec<f64>>,
}

#[derive(Debug)]
pub struct LocalOutlierFactor {
    /// Effective neighbor count, `min(n_neighbors, n_train - 1)`
    k: usize,
    k_distances: Array1<f64>,
    lrd: Array1<f64>,
    index: Box<dyn KnnSearch>,
}

impl LocalOutlierFactor {
    pub const NAME: &'static str = "LocalOutlierFactor";

    /// Rebuild the fitted state from training points alone
    pub fn new(training: Array2<f64>, n_neighbors: usize) -> Result<Self, AnalysisError> {
        let (k, index) = Self::prepare(&training, n_neighbors)?;

        let neighborhoods: Vec<Vec<Neighbor>> = training
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                index
                    .nearest(row, k + 1)
                    .into_iter()
                    .filter(|n| n.index != i)
                    .take(k)
                    .collect()
            })
            .collect();

        let k_distances: Array1<f64> = neighborhoods
            .iter()
            .map(|hood| hood.last().map(|n| n.distance).unwrap_or(0.0))
            .collect();

        let lrd: Array1<f64> = neighborhoods
            .iter()
            .map(|hood| reachability_density(hood, &k_distances))
            .collect();

        Ok(Self {
            k,
            k_distances,
            lrd,
            index,
        })
    }

    /// Use precomputed k-distances and densities from the artifact
    pub fn with_fitted_state(
        training: Array2<f64>,
        n_neighbors: usize,
        k_distances: Vec<f64>,
        lrd: Vec<f64>,
    ) -> Result<Self, AnalysisError> {
        let n_train = training.nrows();
        for (name, values) in [("k_distances", &k_distances), ("lrd", &lrd)] {
            if values.len() != n_train {
                return Err(AnalysisError::ArtifactError(format!(
                    "{}: {} has {} entries for {} training points",
                    Self::NAME,
                    name,
                    values.len(),
                    n_train
                )));
            }
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(AnalysisError::ArtifactError(format!(
                    "{}: {} must be finite and non-negative",
                    Self::NAME,
                    name
                )));
            }
        }

        let (k, index) = Self::prepare(&training, n_neighbors)?;
        Ok(Self {
            k,
            k_distances: Array1::from(k_distances),
            lrd: Array1::from(lrd),
            index,
        })
    }

    pub fn from_params(params: &serde_json::Value) -> Result<Step, AnalysisError> {
        let p: LofParams = parse_params(Self::NAME, params)?;
        let training = rows_to_matrix(&p.training, "LocalOutlierFactor training")?;
        let lof = match (p.k_distances, p.lrd) {
            (Some(k_distances), Some(lrd)) => {
                Self::with_fitted_state(training, p.n_neighbors, k_distances, lrd)?
            }
            (None, None) => Self::new(training, p.n_neighbors)?,
            _ => {
                return Err(AnalysisError::ArtifactError(format!(
                    "{}: k_distances and lrd must be given together",
                    Self::NAME
                )))
            }
        };
        Ok(Step::Score(Box::new(lof)))
    }

    fn prepare(
        training: &Array2<f64>,
        n_neighbors: usize,
    ) -> Result<(usize, Box<dyn KnnSearch>), AnalysisError> {
        validate_fitted_points(training)?;
        if n_neighbors == 0 {
            return Err(AnalysisError::ArtifactError(format!(
                "{}: n_neighbors must be > 0",
                Self::NAME
            )));
        }
        if training.nrows() < 2 {
            return Err(AnalysisError::ArtifactError(format!(
                "{} needs at least 2 training points",
                Self::NAME
            )));
        }
        let k = n_neighbors.min(training.nrows() - 1);
        Ok((k, build_index(training)?))
    }

    pub fn n_neighbors(&self) -> usize {
        self.k
    }

    pub fn n_train(&self) -> usize {
        self.index.len()
    }

    fn score_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        if row.iter().any(|v| !v.is_finite()) {
            return f64::NAN;
        }
        let hood = self.index.nearest(row, self.k);
        if hood.is_empty() {
            return f64::NAN;
        }
        let lrd_x = reachability_density(&hood, &self.k_distances);
        let ratio = hood.iter().map(|n| self.lrd[n.index] / lrd_x).sum::<f64>() / hood.len() as f64;
        -ratio
    }
}

fn reachability_density(hood: &[Neighbor], k_distances: &Array1<f64>) -> f64 {
    if hood.is_empty() {
        return 0.0;
    }
    let mean_reach = hood
        .iter()
        .map(|n| n.distance.max(k_distances[n.index]))
        .sum::<f64>()
        / hood.len() as f64;
    1.0 / (mean_reach + LRD_EPS)
}

impl OutlierScorer for LocalOutlierFactor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn n_features_in(&self) -> usize {
        self.index.dims()
    }

    fn describe(&self) -> ScorerInfo {
        ScorerInfo {
            n_neighbors: self.k,
            n_train: self.index.len(),
        }
    }

    fn score_samples(&self, features: &Array2<f64>) -> Result<Vec<f64>, AnalysisError> {
        check_width(features, self.index.dims(), Self::NAME)?;
        Ok(features.rows().into_iter().map(|row| self.score_row(row)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use serde_json::json;

    fn grid() -> Array2<f64> {
        arr2(&[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]])
    }

    #[test]
    fn test_fitted_state_of_square() {
        let lof = LocalOutlierFactor::new(grid(), 2).unwrap();

        // every corner has two neighbors at distance 1
        assert!(lof.k_distances.iter().all(|&d| (d - 1.0).abs() < 1e-12));
        assert!(lof.lrd.iter().all(|&d| (d - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_inlier_scores_near_minus_one() {
        let lof = LocalOutlierFactor::new(grid(), 2).unwrap();
        let scores = lof.score_samples(&arr2(&[[0.0, 0.0]])).unwrap();
        assert!((scores[0] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_far_point_scores_lower() {
        let lof = LocalOutlierFactor::new(grid(), 2).unwrap();
        let scores = lof
            .score_samples(&arr2(&[[0.5, 0.5], [10.0, 10.0]]))
            .unwrap();

        assert!(scores[1] < scores[0]);
        assert!(scores[1] < -5.0);
    }

    #[test]
    fn test_non_finite_row_scores_nan() {
        let lof = LocalOutlierFactor::new(grid(), 2).unwrap();
        let scores = lof
            .score_samples(&arr2(&[[f64::NAN, 0.0], [0.0, 0.0]]))
            .unwrap();
        assert!(scores[0].is_nan());
        assert!(scores[1].is_finite());
    }

    #[test]
    fn test_n_neighbors_clamped_to_training_size() {
        let lof = LocalOutlierFactor::new(grid(), 20).unwrap();
        assert_eq!(lof.n_neighbors(), 3);
        assert_eq!(lof.n_train(), 4);
    }

    #[test]
    fn test_precomputed_state_matches_derived() {
        let derived = LocalOutlierFactor::new(grid(), 2).unwrap();
        let loaded = LocalOutlierFactor::with_fitted_state(
            grid(),
            2,
            derived.k_distances.to_vec(),
            derived.lrd.to_vec(),
        )
        .unwrap();

        let query = arr2(&[[3.0, 0.5], [0.2, 0.9]]);
        assert_eq!(
            derived.score_samples(&query).unwrap(),
            loaded.score_samples(&query).unwrap()
        );
    }

    #[test]
    fn test_width_mismatch() {
        let lof = LocalOutlierFactor::new(grid(), 2).unwrap();
        assert!(matches!(
            lof.score_samples(&arr2(&[[1.0, 2.0, 3.0]])),
            Err(AnalysisError::SchemaError(_))
        ));
    }

    #[test]
    fn test_invalid_params() {
        assert!(LocalOutlierFactor::new(arr2(&[[1.0, 2.0]]), 2).is_err());
        assert!(LocalOutlierFactor::new(grid(), 0).is_err());
        assert!(LocalOutlierFactor::from_params(&json!({
            "n_neighbors": 2,
            "training": [[0.0], [1.0]],
            "lrd": [1.0, 1.0]
        }))
        .is_err());
        assert!(LocalOutlierFactor::with_fitted_state(grid(), 2, vec![1.0; 3], vec![1.0; 4]).is_err());
    }

    #[test]
    fn test_duplicate_training_rows() {
        // 60 identical rows are more than one tree bucket can hold
        let mut training = vec![vec![1.0]; 60];
        training.extend((0..40).map(|i| vec![2.0 + i as f64 * 0.1]));

        let step = LocalOutlierFactor::from_params(&json!({
            "n_neighbors": 5,
            "training": training
        }))
        .unwrap();
        let lof = match step {
            Step::Score(scorer) => scorer,
            other => panic!("unexpected step {}", other.name()),
        };
        assert_eq!(lof.describe().n_train, 100);

        let scores = lof
            .score_samples(&arr2(&[[1.0], [3.0], [50.0]]))
            .unwrap();
        assert!(scores.iter().all(|s| s.is_finite()));
        assert!((scores[0] + 1.0).abs() < 1e-6);
        assert!(scores[2] < scores[1]);
    }
}
