use std::cmp::Ordering;

use serde::Serialize;

/// Row indices ordered by descending score
///
/// The sort is stable, so equal scores keep their input order. NaN
/// scores rank after every finite score.
pub fn rank_descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| compare_desc(scores[a], scores[b]));
    order
}

fn compare_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Number of rows to return for a requested `top_k`
///
/// Absent requests use `default`; zero or negative requests return nothing.
pub fn clamp_top_k(requested: Option<i64>, default: usize, n_rows: usize) -> usize {
    match requested {
        None => default.min(n_rows),
        Some(k) if k <= 0 => 0,
        Some(k) => usize::try_from(k).unwrap_or(usize::MAX).min(n_rows),
    }
}

/// Distribution of finite scores, logged per request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub count: usize,
    pub missing: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl ScoreSummary {
    /// Summarize scores; `None` when no score is finite
    pub fn compute(scores: &[f64]) -> Option<Self> {
        let values: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();

        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let sum: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(ScoreSummary {
            count,
            missing: scores.len() - count,
            mean: sum / count as f64,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_descending() {
        assert_eq!(rank_descending(&[0.5, 3.0, 1.0]), vec![1, 2, 0]);
    }

    #[test]
    fn test_rank_ties_keep_input_order() {
        assert_eq!(rank_descending(&[1.0, 2.0, 1.0, 2.0]), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_rank_nan_last() {
        assert_eq!(rank_descending(&[f64::NAN, 1.0, f64::NAN, 2.0]), vec![3, 1, 0, 2]);
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank_descending(&[]).is_empty());
    }

    #[test]
    fn test_clamp_top_k() {
        assert_eq!(clamp_top_k(None, 10, 2), 2);
        assert_eq!(clamp_top_k(None, 10, 50), 10);
        assert_eq!(clamp_top_k(Some(3), 10, 50), 3);
        assert_eq!(clamp_top_k(Some(100), 10, 5), 5);
        assert_eq!(clamp_top_k(Some(0), 10, 5), 0);
        assert_eq!(clamp_top_k(Some(-4), 10, 5), 0);
    }

    #[test]
    fn test_score_summary() {
        let summary = ScoreSummary::compute(&[1.0, f64::NAN, 3.0, 5.0]).unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.mean, 3.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 5.0);
    }

    #[test]
    fn test_score_summary_no_finite_scores() {
        assert!(ScoreSummary::compute(&[]).is_none());
        assert!(ScoreSummary::compute(&[f64::NAN]).is_none());
    }
}
