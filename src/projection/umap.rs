//! UMAP (Uniform Manifold Approximation and Projection)
//!
//! Nonlinear dimensionality reduction for 2D layouts (McInnes et al., 2018):
//! - Exact KNN graph from the Euclidean [`NeighborIndex`]
//! - Fuzzy simplicial set with binary-search sigma and fuzzy-union symmetrization
//! - SGD layout optimization with per-edge sampling schedule and negative sampling
//!
//! The graph is built in parallel but the SGD phase is sequential, so a fixed seed
//! reproduces the layout bit for bit regardless of the thread count.

use crate::error::PipelineResult;
use crate::neighbors::{DistanceMetric, NeighborIndex, NeighborList};
use crate::projection::{ProjectionMethod, Projector, ensure_min_samples};
use crate::types::{Coordinate, EmbeddingMatrix};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const SMOOTH_K_TOLERANCE: f64 = 1e-5;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_RANGE: f64 = 10.0;

/// UMAP configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UmapConfig {
    /// Number of nearest neighbors (controls local vs global structure)
    pub n_neighbors: usize,
    /// Minimum distance between points in the embedding
    pub min_dist: f64,
    /// Spread of the embedding
    pub spread: f64,
    /// Number of optimization epochs
    pub n_epochs: usize,
    /// SGD learning rate
    pub learning_rate: f64,
    /// Number of negative samples per positive edge
    pub negative_sample_rate: usize,
}

impl Default for UmapConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            min_dist: 0.1,
            spread: 1.0,
            n_epochs: 200,
            learning_rate: 1.0,
            negative_sample_rate: 5,
        }
    }
}

/// An edge in the fuzzy simplicial set
#[derive(Debug, Clone, Copy)]
struct Edge {
    i: usize,
    j: usize,
    weight: f64,
}

/// UMAP dimensionality reduction
#[derive(Debug, Clone)]
pub struct Umap {
    config: UmapConfig,
    seed: u64,
}

impl Umap {
    pub fn new(config: UmapConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    /// Run UMAP on the matrix. Returns one 2D coordinate per row.
    pub fn fit_transform(&self, matrix: &EmbeddingMatrix) -> PipelineResult<Vec<Coordinate>> {
        let n = matrix.len();
        ensure_min_samples(ProjectionMethod::Umap, n)?;

        let k = self.config.n_neighbors.clamp(2, n - 1);

        // Phase 1: KNN graph
        let knn = NeighborIndex::build(matrix, DistanceMetric::Euclidean)?.all_neighbors(k)?;

        // Phase 2: Fuzzy simplicial set
        let edges = fuzzy_simplicial_set(&knn, k);

        // Phase 3: SGD layout optimization
        let (a, b) = find_ab_params(self.config.spread, self.config.min_dist);
        debug!(n, k, edges = edges.len(), a, b, "umap graph ready");

        Ok(self.optimize_layout(n, &edges, a, b))
    }

    /// Phase 3: SGD layout optimization with negative sampling.
    fn optimize_layout(&self, n: usize, edges: &[Edge], a: f64, b: f64) -> Vec<Coordinate> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut embedding: Vec<Coordinate> = (0..n)
            .map(|_| {
                [
                    rng.random_range(-INIT_RANGE..INIT_RANGE),
                    rng.random_range(-INIT_RANGE..INIT_RANGE),
                ]
            })
            .collect();

        let n_epochs = self.config.n_epochs.max(1);
        let max_weight = edges.iter().map(|e| e.weight).fold(0.0_f64, f64::max);
        if max_weight <= 0.0 {
            return embedding;
        }

        // Edges sampled less than once over the whole run are dropped
        let schedule: Vec<(Edge, f64)> = edges
            .iter()
            .map(|&edge| (edge, max_weight / edge.weight))
            .filter(|&(_, per_sample)| per_sample <= n_epochs as f64)
            .collect();

        let neg_rate = self.config.negative_sample_rate as f64;
        let mut next_sample: Vec<f64> = schedule.iter().map(|&(_, eps)| eps).collect();
        let per_negative: Vec<f64> = schedule
            .iter()
            .map(|&(_, eps)| if neg_rate > 0.0 { eps / neg_rate } else { f64::INFINITY })
            .collect();
        let mut next_negative = per_negative.clone();

        for epoch in 0..n_epochs {
            let alpha = self.config.learning_rate * (1.0 - epoch as f64 / n_epochs as f64);
            let current = (epoch + 1) as f64;

            for (e, &(edge, epochs_per_sample)) in schedule.iter().enumerate() {
                if next_sample[e] > current {
                    continue;
                }
                let (i, j) = (edge.i, edge.j);

                // Attractive force
                let dy = diff(&embedding[i], &embedding[j]);
                let dist_sq = dy[0] * dy[0] + dy[1] * dy[1];
                let grad_coeff = if dist_sq > 0.0 {
                    -2.0 * a * b * dist_sq.powf(b - 1.0) / (a * dist_sq.powf(b) + 1.0)
                } else {
                    0.0
                };
                for d in 0..2 {
                    let grad = clip(grad_coeff * dy[d]);
                    embedding[i][d] += grad * alpha;
                    embedding[j][d] -= grad * alpha;
                }
                next_sample[e] += epochs_per_sample;

                // Negative sampling (repulsive forces)
                let n_neg =
                    ((current - next_negative[e]) / per_negative[e]).floor().max(0.0) as usize;
                for _ in 0..n_neg {
                    let k = rng.random_range(0..n);
                    if k == i {
                        continue;
                    }
                    let dy = diff(&embedding[i], &embedding[k]);
                    let dist_sq = dy[0] * dy[0] + dy[1] * dy[1];
                    let grad_coeff = if dist_sq > 0.0 {
                        2.0 * b / ((0.001 + dist_sq) * (a * dist_sq.powf(b) + 1.0))
                    } else {
                        0.0
                    };
                    for d in 0..2 {
                        let grad = if grad_coeff > 0.0 {
                            clip(grad_coeff * dy[d])
                        } else {
                            GRADIENT_CLIP
                        };
                        embedding[i][d] += grad * alpha;
                    }
                }
                next_negative[e] += n_neg as f64 * per_negative[e];
            }
        }

        embedding
    }
}

impl Projector for Umap {
    fn method(&self) -> ProjectionMethod {
        ProjectionMethod::Umap
    }

    fn project(&self, matrix: &EmbeddingMatrix) -> PipelineResult<Vec<Coordinate>> {
        self.fit_transform(matrix)
    }
}

/// Phase 2: Compute fuzzy simplicial set (edge weights).
/// For each point, find rho (nearest positive neighbor distance) and sigma
/// (smooth normalization via binary search), then take the fuzzy union.
fn fuzzy_simplicial_set(knn: &[NeighborList], k: usize) -> Vec<Edge> {
    let target = (k as f64).log2();

    let params: Vec<(f64, f64)> = knn
        .par_iter()
        .map(|list| smooth_knn_dist(list.distances(), target))
        .collect();

    // Directed memberships keyed by unordered pair: (w_ij for i<j, w_ji)
    let mut pairs: BTreeMap<(usize, usize), (f64, f64)> = BTreeMap::new();
    for (i, list) in knn.iter().enumerate() {
        let (rho, sigma) = params[i];
        for (j, d) in list.iter() {
            let w = (-(d - rho).max(0.0) / sigma).exp();
            let entry = pairs.entry((i.min(j), i.max(j))).or_insert((0.0, 0.0));
            if i < j {
                entry.0 = w;
            } else {
                entry.1 = w;
            }
        }
    }

    pairs
        .into_iter()
        .map(|((i, j), (w_ij, w_ji))| Edge {
            i,
            j,
            weight: w_ij + w_ji - w_ij * w_ji,
        })
        .filter(|edge| edge.weight > 0.0)
        .collect()
}

/// Returns `(rho, sigma)` so that the membership strengths of `distances` sum to `target`.
fn smooth_knn_dist(distances: &[f64], target: f64) -> (f64, f64) {
    let rho = distances.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);

    let mut lo = 0.0_f64;
    let mut hi = f64::INFINITY;
    let mut sigma = 1.0_f64;

    for _ in 0..64 {
        let sum: f64 = distances
            .iter()
            .map(|&d| {
                let shifted = d - rho;
                if shifted > 0.0 { (-shifted / sigma).exp() } else { 1.0 }
            })
            .sum();

        if (sum - target).abs() < SMOOTH_K_TOLERANCE {
            break;
        }
        if sum > target {
            hi = sigma;
            sigma = (lo + hi) / 2.0;
        } else {
            lo = sigma;
            sigma = if hi.is_infinite() { sigma * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    let mean = distances.iter().sum::<f64>() / distances.len().max(1) as f64;
    let floor = (MIN_K_DIST_SCALE * mean).max(f64::MIN_POSITIVE);
    (rho, sigma.max(floor))
}

/// Fit `a, b` so that `1 / (1 + a * d^(2b))` approximates the offset exponential
/// membership curve defined by `spread` and `min_dist` in the least-squares sense.
fn find_ab_params(spread: f64, min_dist: f64) -> (f64, f64) {
    const SAMPLES: usize = 300;
    let xs: Vec<f64> = (0..SAMPLES)
        .map(|i| 3.0 * spread * i as f64 / (SAMPLES - 1) as f64)
        .collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| if x < min_dist { 1.0 } else { (-(x - min_dist) / spread).exp() })
        .collect();

    let sse = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| (1.0 / (1.0 + a * x.powf(2.0 * b)) - y).powi(2))
            .sum()
    };
    let best_a = |b: f64| -> f64 {
        golden_section(|log_a| sse(log_a.exp(), b), 1e-3_f64.ln(), 1e3_f64.ln(), 60).exp()
    };

    let b = golden_section(|b| sse(best_a(b), b), 0.1, 3.0, 60);
    (best_a(b), b)
}

/// Minimizes a unimodal `f` on `[lo, hi]`.
fn golden_section(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64, iterations: usize) -> f64 {
    let ratio = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut c = hi - ratio * (hi - lo);
    let mut d = lo + ratio * (hi - lo);
    let mut fc = f(c);
    let mut fd = f(d);

    for _ in 0..iterations {
        if fc < fd {
            hi = d;
            d = c;
            fd = fc;
            c = hi - ratio * (hi - lo);
            fc = f(c);
        } else {
            lo = c;
            c = d;
            fc = fd;
            d = lo + ratio * (hi - lo);
            fd = f(d);
        }
    }
    (lo + hi) / 2.0
}

fn diff(p: &Coordinate, q: &Coordinate) -> Coordinate {
    [p[0] - q[0], p[1] - q[1]]
}

fn clip(value: f64) -> f64 {
    value.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}
