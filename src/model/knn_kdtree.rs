//! KD-Tree based nearest neighbor search over the fitted training points
//!
//! Points with up to [`MAX_TREE_DIMS`] coordinates are indexed in a kiddo
//! KD-Tree sized to their exact dimension. Wider points, and point sets
//! where one coordinate value repeats often enough to fill a whole tree
//! bucket, fall back to an exact linear scan.

use std::fmt;

use kiddo::KdTree;
use kiddo::SquaredEuclidean;
use ndarray::{Array2, ArrayView1};

use crate::utils::AnalysisError;

/// Maximum number of dimensions indexed with a KD-Tree
pub const MAX_TREE_DIMS: usize = 16;

/// Leaf capacity of `kiddo::KdTree`; a bucket whose points all share one
/// coordinate on the split axis cannot be split
const TREE_BUCKET_SIZE: usize = 32;

/// A training point returned by a neighbor query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    /// Euclidean distance to the query
    pub distance: f64,
}

/// Nearest neighbor lookup over a fixed set of points
pub trait KnnSearch: Send + Sync + fmt::Debug {
    /// Up to `k` nearest points ordered by increasing distance
    fn nearest(&self, query: ArrayView1<'_, f64>, k: usize) -> Vec<Neighbor>;

    fn len(&self) -> usize;

    fn dims(&self) -> usize;
}

struct KdTreeIndex<const D: usize> {
    tree: KdTree<f64, D>,
    size: usize,
}

impl<const D: usize> KdTreeIndex<D> {
    fn build(points: &Array2<f64>) -> Self {
        let mut tree: KdTree<f64, D> = KdTree::new();
        for (i, row) in points.rows().into_iter().enumerate() {
            tree.add(&to_point::<D>(row), i as u64);
        }
        Self {
            tree,
            size: points.nrows(),
        }
    }
}

impl<const D: usize> fmt::Debug for KdTreeIndex<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KdTreeIndex")
            .field("dims", &D)
            .field("size", &self.size)
            .finish()
    }
}

impl<const D: usize> KnnSearch for KdTreeIndex<D> {
    fn nearest(&self, query: ArrayView1<'_, f64>, k: usize) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        self.tree
            .nearest_n::<SquaredEuclidean>(&to_point::<D>(query), k)
            .into_iter()
            .map(|n| Neighbor {
                index: n.item as usize,
                distance: n.distance.sqrt(),
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.size
    }

    fn dims(&self) -> usize {
        D
    }
}

fn to_point<const D: usize>(row: ArrayView1<'_, f64>) -> [f64; D] {
    let mut point = [0.0; D];
    for (j, &val) in row.iter().enumerate().take(D) {
        point[j] = val;
    }
    point
}

/// Linear scan used above [`MAX_TREE_DIMS`]
#[derive(Debug)]
struct ExactIndex {
    points: Array2<f64>,
}

impl KnnSearch for ExactIndex {
    fn nearest(&self, query: ArrayView1<'_, f64>, k: usize) -> Vec<Neighbor> {
        let mut all: Vec<Neighbor> = self
            .points
            .rows()
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let squared: f64 = row
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                Neighbor {
                    index,
                    distance: squared.sqrt(),
                }
            })
            .collect();
        all.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        all.truncate(k);
        all
    }

    fn len(&self) -> usize {
        self.points.nrows()
    }

    fn dims(&self) -> usize {
        self.points.ncols()
    }
}

/// Build a neighbor index over the rows of `points`
///
/// # Returns
/// * `Ok(index)` - KD-Tree for 1..=16 columns, exact scan otherwise
/// * `Err(AnalysisError::ValidationError)` - if there are no rows or columns,
///   or a coordinate is NaN or Inf
pub fn build_index(points: &Array2<f64>) -> Result<Box<dyn KnnSearch>, AnalysisError> {
    let (n_samples, n_features) = points.dim();

    if n_samples == 0 {
        return Err(AnalysisError::ValidationError(
            "cannot index an empty set of points".into(),
        ));
    }

    if n_features == 0 {
        return Err(AnalysisError::ValidationError(
            "points must have at least one coordinate".into(),
        ));
    }

    if points.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::ValidationError(
            "points contain NaN or Inf values".into(),
        ));
    }

    let repeats = max_axis_repeats(points);
    if repeats >= TREE_BUCKET_SIZE {
        tracing::debug!(
            repeats,
            n_samples,
            "coordinate repeats exceed the tree bucket, using exact search"
        );
        return Ok(Box::new(ExactIndex {
            points: points.clone(),
        }));
    }

    let index: Box<dyn KnnSearch> = match n_features {
        1 => Box::new(KdTreeIndex::<1>::build(points)),
        2 => Box::new(KdTreeIndex::<2>::build(points)),
        3 => Box::new(KdTreeIndex::<3>::build(points)),
        4 => Box::new(KdTreeIndex::<4>::build(points)),
        5 => Box::new(KdTreeIndex::<5>::build(points)),
        6 => Box::new(KdTreeIndex::<6>::build(points)),
        7 => Box::new(KdTreeIndex::<7>::build(points)),
        8 => Box::new(KdTreeIndex::<8>::build(points)),
        9 => Box::new(KdTreeIndex::<9>::build(points)),
        10 => Box::new(KdTreeIndex::<10>::build(points)),
        11 => Box::new(KdTreeIndex::<11>::build(points)),
        12 => Box::new(KdTreeIndex::<12>::build(points)),
        13 => Box::new(KdTreeIndex::<13>::build(points)),
        14 => Box::new(KdTreeIndex::<14>::build(points)),
        15 => Box::new(KdTreeIndex::<15>::build(points)),
        16 => Box::new(KdTreeIndex::<16>::build(points)),
        _ => Box::new(ExactIndex {
            points: points.clone(),
        }),
    };

    Ok(index)
}

/// Largest number of points sharing one value on any single axis
fn max_axis_repeats(points: &Array2<f64>) -> usize {
    points
        .columns()
        .into_iter()
        .map(|column| {
            let mut values: Vec<f64> = column.to_vec();
            values.sort_by(|a, b| a.total_cmp(b));

            let mut longest = 0;
            let mut run = 0;
            let mut previous: Option<f64> = None;
            for v in values {
                run = if previous == Some(v) { run + 1 } else { 1 };
                longest = longest.max(run);
                previous = Some(v);
            }
            longest
        })
        .max()
        .unwrap_or(0)
}
