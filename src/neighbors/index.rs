//! Exact k-nearest-neighbor search over an embedding matrix.
//!
//! # Algorithm Details
//! - Brute force: every query scans all N vectors
//! - Bounded max-heap of size k per query, O(N log k)
//! - Ordering is `(distance, index)` under `f64::total_cmp`, so equal distances
//!   resolve to the lower neighbor index
//! - Queries run in parallel over objects with rayon; each query is independent,
//!   so results do not depend on the thread count
//! - A non-finite distance (finite inputs whose magnitudes overflow f64) fails
//!   the search instead of sorting as a bogus nearest neighbor

use crate::error::{PipelineError, PipelineResult};
use crate::neighbors::metric::{DistanceMetric, cosine_distance_with_norms, l2_norm};
use crate::types::EmbeddingMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Ordered neighbors of one object under one metric.
///
/// Serialized as `{"knn_ind": [...], "knn_dist": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborList {
    #[serde(rename = "knn_ind")]
    indices: Vec<usize>,
    #[serde(rename = "knn_dist")]
    distances: Vec<f64>,
}

impl NeighborList {
    /// Builds a list from parallel arrays.
    ///
    /// # Panics
    /// Panics if the arrays differ in length.
    #[must_use]
    pub fn new(indices: Vec<usize>, distances: Vec<f64>) -> Self {
        assert_eq!(
            indices.len(),
            distances.len(),
            "neighbor indices and distances must be index-aligned"
        );
        Self { indices, distances }
    }

    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[must_use]
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// `(neighbor_index, distance)` pairs, nearest first.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices
            .iter()
            .copied()
            .zip(self.distances.iter().copied())
    }

    /// Applies `f` to every distance, keeping the neighbor order.
    #[must_use]
    pub fn map_distances(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            indices: self.indices,
            distances: self.distances.into_iter().map(f).collect(),
        }
    }
}

/// Heap entry ordered by `(distance, index)`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on (distance, index) so the worst candidate is evicted first
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Searchable view of an embedding matrix under one metric.
pub struct NeighborIndex<'a> {
    matrix: &'a EmbeddingMatrix,
    metric: DistanceMetric,
    /// Row norms, precomputed for cosine distance only.
    norms: Option<Vec<f64>>,
}

impl<'a> NeighborIndex<'a> {
    /// Builds the index. Fails when the matrix has fewer than two rows.
    pub fn build(matrix: &'a EmbeddingMatrix, metric: DistanceMetric) -> PipelineResult<Self> {
        if matrix.len() <= 1 {
            return Err(PipelineError::InvalidInput {
                reason: format!(
                    "nearest-neighbor search needs at least 2 embeddings, got {}",
                    matrix.len()
                ),
            });
        }

        let norms = (metric == DistanceMetric::Cosine)
            .then(|| matrix.rows().par_iter().map(|row| l2_norm(row)).collect());

        Ok(Self {
            matrix,
            metric,
            norms,
        })
    }

    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Distance between rows `i` and `j` under this index's metric.
    #[must_use]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        match &self.norms {
            Some(norms) => cosine_distance_with_norms(
                self.matrix.row(i),
                self.matrix.row(j),
                norms[i],
                norms[j],
            ),
            None => self.metric.distance(self.matrix.row(i), self.matrix.row(j)),
        }
    }

    /// Checks `0 < max_k < N`.
    pub fn validate_k(&self, max_k: usize) -> PipelineResult<()> {
        validate_max_k(max_k, self.matrix.len())
    }

    /// The `k` nearest other objects of `query`, nearest first.
    ///
    /// The caller guarantees `k < N`.
    pub fn query(&self, query: usize, k: usize) -> PipelineResult<NeighborList> {
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);

        for index in 0..self.matrix.len() {
            if index == query {
                continue;
            }
            let distance = self.distance(query, index);
            if !distance.is_finite() {
                return Err(PipelineError::NonFiniteDistance {
                    metric: self.metric,
                    i: query,
                    j: index,
                });
            }
            let candidate = Candidate { distance, index };

            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate < *worst {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        let (indices, distances) = heap
            .into_sorted_vec()
            .into_iter()
            .map(|candidate| (candidate.index, candidate.distance))
            .unzip();
        Ok(NeighborList::new(indices, distances))
    }

    /// Neighbor lists for every object, index-aligned with the matrix.
    pub fn all_neighbors(&self, max_k: usize) -> PipelineResult<Vec<NeighborList>> {
        self.validate_k(max_k)?;

        (0..self.matrix.len())
            .into_par_iter()
            .map(|query| self.query(query, max_k))
            .collect()
    }
}

/// Checks `0 < max_k < n`.
pub fn validate_max_k(max_k: usize, n: usize) -> PipelineResult<()> {
    if max_k == 0 || max_k >= n {
        return Err(PipelineError::InvalidMaxK { max_k, n });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_with_outlier() -> EmbeddingMatrix {
        EmbeddingMatrix::new(vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![5.0, 5.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_euclidean_neighbors_with_tie_break() {
        let matrix = square_with_outlier();
        let index = NeighborIndex::build(&matrix, DistanceMetric::Euclidean).unwrap();
        let lists = index.all_neighbors(2).unwrap();

        assert_eq!(lists.len(), 4);
        assert_eq!(lists[0].indices(), &[1, 2]);
        assert_eq!(lists[0].distances(), &[1.0, 1.0]);

        let expected = 41.0_f64.sqrt();
        assert_eq!(lists[3].indices(), &[1, 2]);
        assert!((lists[3].distances()[0] - expected).abs() < 1e-12);
        assert!((lists[3].distances()[1] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_never_returns_self() {
        let matrix = square_with_outlier();
        for metric in DistanceMetric::ALL {
            let index = NeighborIndex::build(&matrix, metric).unwrap();
            for (i, list) in index.all_neighbors(3).unwrap().iter().enumerate() {
                assert_eq!(list.len(), 3);
                assert!(!list.indices().contains(&i), "{metric}: object {i} is its own neighbor");
            }
        }
    }

    #[test]
    fn test_sorted_by_distance_then_index() {
        let matrix = EmbeddingMatrix::new(
            (0..20)
                .map(|i| vec![(i % 5) as f64, (i / 5) as f64])
                .collect(),
        )
        .unwrap();
        let index = NeighborIndex::build(&matrix, DistanceMetric::Euclidean).unwrap();

        for list in index.all_neighbors(7).unwrap() {
            let pairs: Vec<(usize, f64)> = list.iter().collect();
            for window in pairs.windows(2) {
                let (i0, d0) = window[0];
                let (i1, d1) = window[1];
                assert!(d0 < d1 || (d0 == d1 && i0 < i1), "unsorted pair {window:?}");
            }
        }
    }

    #[test]
    fn test_duplicates_are_neighbors() {
        let matrix =
            EmbeddingMatrix::new(vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let index = NeighborIndex::build(&matrix, DistanceMetric::Euclidean).unwrap();
        let lists = index.all_neighbors(1).unwrap();
        assert_eq!(lists[0].indices(), &[1]);
        assert_eq!(lists[0].distances(), &[0.0]);
        assert_eq!(lists[1].indices(), &[0]);
    }

    #[test]
    fn test_k_boundaries() {
        let matrix = square_with_outlier();
        let index = NeighborIndex::build(&matrix, DistanceMetric::Cosine).unwrap();

        // max_k == N - 1 returns every other object
        let lists = index.all_neighbors(3).unwrap();
        for (i, list) in lists.iter().enumerate() {
            let mut seen: Vec<usize> = list.indices().to_vec();
            seen.sort_unstable();
            let expected: Vec<usize> = (0..4).filter(|&j| j != i).collect();
            assert_eq!(seen, expected);
        }

        assert!(matches!(
            index.all_neighbors(4),
            Err(PipelineError::InvalidMaxK { max_k: 4, n: 4 })
        ));
        assert!(matches!(
            index.all_neighbors(0),
            Err(PipelineError::InvalidMaxK { max_k: 0, .. })
        ));
    }

    #[test]
    fn test_overflowing_distances_are_rejected() {
        let matrix =
            EmbeddingMatrix::new(vec![vec![1e200, 1e200], vec![-1e200, 0.0], vec![0.0, 1.0]])
                .unwrap();

        for metric in [DistanceMetric::Cosine, DistanceMetric::Euclidean] {
            let index = NeighborIndex::build(&matrix, metric).unwrap();
            match index.all_neighbors(2) {
                Err(PipelineError::NonFiniteDistance { metric: m, i, j }) => {
                    assert_eq!(m, metric);
                    assert!(i == 0 || j == 0, "{metric}: unexpected pair ({i}, {j})");
                }
                other => panic!("{metric}: expected a non-finite distance error, got {other:?}"),
            }
        }

        // Large but non-overflowing magnitudes still work
        let matrix =
            EmbeddingMatrix::new(vec![vec![1e100, 0.0], vec![-1e100, 0.0], vec![0.0, 1e100]])
                .unwrap();
        let index = NeighborIndex::build(&matrix, DistanceMetric::Euclidean).unwrap();
        assert_eq!(index.all_neighbors(2).unwrap()[0].indices(), &[2, 1]);
    }

    #[test]
    fn test_single_object_rejected() {
        let matrix = EmbeddingMatrix::new(vec![vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            NeighborIndex::build(&matrix, DistanceMetric::Euclidean),
            Err(PipelineError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_cosine_index_matches_metric() {
        let matrix = EmbeddingMatrix::new(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.9, 0.1, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0],
        ])
        .unwrap();
        let index = NeighborIndex::build(&matrix, DistanceMetric::Cosine).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                let expected = DistanceMetric::Cosine.distance(matrix.row(i), matrix.row(j));
                assert!((index.distance(i, j) - expected).abs() < 1e-12);
            }
        }
        // Zero vector sits at distance 1 from everything
        assert_eq!(index.distance(3, 0), 1.0);
    }
}
