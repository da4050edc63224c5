use ndarray::Array2;

use crate::utils::AnalysisError;

/// Validate a fitted point matrix loaded from the artifact
///
/// # Arguments
/// * `points` - Training points in the reduced feature space
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(AnalysisError::ArtifactError)` if empty or containing NaN/Inf
pub fn validate_fitted_points(points: &Array2<f64>) -> Result<(), AnalysisError> {
    if points.nrows() == 0 {
        return Err(AnalysisError::ArtifactError(
            "training matrix cannot be empty".to_string(),
        ));
    }

    if points.ncols() == 0 {
        return Err(AnalysisError::ArtifactError(
            "training matrix must have at least one column".to_string(),
        ));
    }

    if points.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::ArtifactError(
            "training matrix contains NaN or Inf values".to_string(),
        ));
    }

    Ok(())
}

/// Check that a matrix has the column count a step was fitted on
pub fn check_width(features: &Array2<f64>, expected: usize, step: &str) -> Result<(), AnalysisError> {
    if features.ncols() != expected {
        return Err(AnalysisError::SchemaError(format!(
            "{} expects {} features, got {}",
            step,
            expected,
            features.ncols()
        )));
    }
    Ok(())
}

/// Turn nested rows into a matrix, rejecting ragged input
pub fn rows_to_matrix(rows: &[Vec<f64>], what: &str) -> Result<Array2<f64>, AnalysisError> {
    let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
    if let Some(pos) = rows.iter().position(|r| r.len() != n_cols) {
        return Err(AnalysisError::ArtifactError(format!(
            "{} row {} has {} values, expected {}",
            what,
            pos,
            rows[pos].len(),
            n_cols
        )));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), n_cols), flat)
        .map_err(|e| AnalysisError::ArtifactError(format!("failed to build {}: {}", what, e)))
}
