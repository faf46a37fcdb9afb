//! Exact t-SNE (van der Maaten & Hinton, 2008).
//!
//! Affinities are calibrated per row by binary search on the Gaussian precision
//! until the conditional distribution reaches the target perplexity. The layout is
//! optimized by gradient descent with early exaggeration, momentum and per-coordinate
//! gains. Cost is O(N²) per iteration.
//!
//! Memory is O(N²) as well: the distance matrix, the joint probabilities and one
//! N x N kernel buffer that every iteration reuses. At 10k objects that is about
//! 2.4 GB of f64, so large inputs belong with PCA or UMAP.
//!
//! Gradient rows are computed in parallel, but every sum inside a row and the
//! normalization constant are accumulated in a fixed order, so a fixed seed
//! reproduces the layout independently of the thread count.

use crate::error::PipelineResult;
use crate::projection::{ProjectionMethod, Projector, ensure_min_samples};
use crate::types::{Coordinate, EmbeddingMatrix};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
const MIN_PROBABILITY: f64 = 1e-12;
const MIN_GAIN: f64 = 0.01;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const INIT_SCALE: f64 = 1e-4;

/// t-SNE configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TsneConfig {
    /// Effective number of neighbors; capped at (N - 1) / 3
    pub perplexity: f64,
    /// Total gradient descent iterations
    pub n_iterations: usize,
    pub learning_rate: f64,
    /// Multiplier on P during the first `exaggeration_iterations`
    pub early_exaggeration: f64,
    pub exaggeration_iterations: usize,
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            n_iterations: 1000,
            learning_rate: 200.0,
            early_exaggeration: 12.0,
            exaggeration_iterations: 250,
        }
    }
}

/// Exact t-SNE projection to 2D
#[derive(Debug, Clone)]
pub struct Tsne {
    config: TsneConfig,
    seed: u64,
}

impl Tsne {
    pub fn new(config: TsneConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    pub fn fit_transform(&self, matrix: &EmbeddingMatrix) -> PipelineResult<Vec<Coordinate>> {
        let n = matrix.len();
        ensure_min_samples(ProjectionMethod::Tsne, n)?;

        let perplexity = effective_perplexity(self.config.perplexity, n);
        let distances = squared_distances(matrix);
        let p = joint_probabilities(&distances, n, perplexity);
        debug!(n, perplexity, "tsne affinities ready");

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut y: Vec<Coordinate> = (0..n)
            .map(|_| {
                [
                    rng.random_range(-INIT_SCALE..INIT_SCALE),
                    rng.random_range(-INIT_SCALE..INIT_SCALE),
                ]
            })
            .collect();
        let mut update = vec![[0.0f64; 2]; n];
        let mut gains = vec![[1.0f64; 2]; n];
        let mut kernel = vec![0.0f64; n * n];
        let mut grad = vec![[0.0f64; 2]; n];

        for iteration in 0..self.config.n_iterations {
            let exaggerating = iteration < self.config.exaggeration_iterations;
            let exaggeration = if exaggerating {
                self.config.early_exaggeration
            } else {
                1.0
            };
            let momentum = if exaggerating {
                INITIAL_MOMENTUM
            } else {
                FINAL_MOMENTUM
            };

            gradient(&p, &y, exaggeration, &mut kernel, &mut grad);

            for i in 0..n {
                for d in 0..2 {
                    let g = grad[i][d];
                    gains[i][d] = if (g > 0.0) != (update[i][d] > 0.0) {
                        gains[i][d] + 0.2
                    } else {
                        gains[i][d] * 0.8
                    }
                    .max(MIN_GAIN);
                    update[i][d] =
                        momentum * update[i][d] - self.config.learning_rate * gains[i][d] * g;
                    y[i][d] += update[i][d];
                }
            }

            recenter(&mut y);
        }

        Ok(y)
    }
}

impl Projector for Tsne {
    fn method(&self) -> ProjectionMethod {
        ProjectionMethod::Tsne
    }

    fn project(&self, matrix: &EmbeddingMatrix) -> PipelineResult<Vec<Coordinate>> {
        self.fit_transform(matrix)
    }
}

/// Perplexity actually used for `n` samples.
fn effective_perplexity(perplexity: f64, n: usize) -> f64 {
    perplexity.min((n as f64 - 1.0) / 3.0)
}

/// Pairwise squared Euclidean distances, row-major N x N.
fn squared_distances(matrix: &EmbeddingMatrix) -> Vec<f64> {
    let n = matrix.len();
    (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let a = matrix.row(i);
            (0..n).map(move |j| {
                a.iter()
                    .zip(matrix.row(j))
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f64>()
            })
        })
        .collect()
}

/// Symmetric joint probabilities `P = (P_cond + P_cond^T) / 2N`, row-major.
fn joint_probabilities(distances: &[f64], n: usize, perplexity: f64) -> Vec<f64> {
    let conditional: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| conditional_row(&distances[i * n..(i + 1) * n], i, perplexity))
        .collect();

    let norm = 2.0 * n as f64;
    let mut p = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                p[i * n + j] = ((conditional[i][j] + conditional[j][i]) / norm).max(MIN_PROBABILITY);
            }
        }
    }
    p
}

/// Conditional distribution of row `i` whose entropy matches `ln(perplexity)`.
fn conditional_row(distances: &[f64], i: usize, perplexity: f64) -> Vec<f64> {
    let target = perplexity.ln();
    let offset = distances
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(_, &d)| d)
        .fold(f64::INFINITY, f64::min);

    let mut beta = 1.0_f64;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;
    let mut row = vec![0.0f64; distances.len()];

    for _ in 0..PERPLEXITY_STEPS {
        let mut sum = 0.0;
        let mut weighted = 0.0;
        for (j, &d) in distances.iter().enumerate() {
            if j == i {
                row[j] = 0.0;
                continue;
            }
            // Shifting by the nearest distance keeps exp() away from underflow
            let shifted = d - offset;
            let value = (-beta * shifted).exp();
            row[j] = value;
            sum += value;
            weighted += shifted * value;
        }

        let entropy = sum.ln() + beta * weighted / sum;
        let gap = entropy - target;
        row.iter_mut().for_each(|v| *v /= sum);

        if gap.abs() < PERPLEXITY_TOLERANCE {
            break;
        }
        if gap > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_infinite() {
                beta * 2.0
            } else {
                (beta + beta_max) / 2.0
            };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() {
                beta / 2.0
            } else {
                (beta + beta_min) / 2.0
            };
        }
    }

    row
}

/// KL gradient with respect to the layout, written into `grad`.
///
/// `kernel` is N x N row-major scratch space; its previous contents are ignored.
fn gradient(
    p: &[f64],
    y: &[Coordinate],
    exaggeration: f64,
    kernel: &mut [f64],
    grad: &mut [Coordinate],
) {
    let n = y.len();

    kernel
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(i, row)| {
            for (j, q) in row.iter_mut().enumerate() {
                *q = if i == j {
                    0.0
                } else {
                    let dx = y[i][0] - y[j][0];
                    let dy = y[i][1] - y[j][1];
                    1.0 / (1.0 + dx * dx + dy * dy)
                };
            }
        });

    let kernel: &[f64] = kernel;
    let z: f64 = kernel
        .chunks(n)
        .map(|row| row.iter().sum::<f64>())
        .sum::<f64>()
        .max(f64::MIN_POSITIVE);

    grad.par_iter_mut().enumerate().for_each(|(i, out)| {
        let mut g = [0.0f64; 2];
        for j in 0..n {
            if i == j {
                continue;
            }
            let q = kernel[i * n + j];
            let force = (exaggeration * p[i * n + j] - q / z) * q;
            g[0] += force * (y[i][0] - y[j][0]);
            g[1] += force * (y[i][1] - y[j][1]);
        }
        *out = [4.0 * g[0], 4.0 * g[1]];
    });
}

fn recenter(y: &mut [Coordinate]) {
    let n = y.len() as f64;
    let mean = [
        y.iter().map(|p| p[0]).sum::<f64>() / n,
        y.iter().map(|p| p[1]).sum::<f64>() / n,
    ];
    for point in y.iter_mut() {
        point[0] -= mean[0];
        point[1] -= mean[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn two_clusters() -> EmbeddingMatrix {
        let mut rows = Vec::new();
        for i in 0..10 {
            let t = i as f64 * 0.05;
            rows.push(vec![t, 0.1 * t, 0.0, 0.2 * t]);
        }
        for i in 0..10 {
            let t = i as f64 * 0.05;
            rows.push(vec![8.0 + t, 8.0, 8.0 - 0.1 * t, 8.0]);
        }
        EmbeddingMatrix::new(rows).unwrap()
    }

    fn quick_config() -> TsneConfig {
        TsneConfig {
            n_iterations: 500,
            ..Default::default()
        }
    }

    #[test]
    fn test_effective_perplexity_cap() {
        assert_eq!(effective_perplexity(30.0, 10), 3.0);
        assert_eq!(effective_perplexity(5.0, 100), 5.0);
    }

    #[test]
    fn test_conditional_row_matches_perplexity() {
        let distances = [0.0, 1.0, 2.0, 4.0, 9.0, 16.0, 25.0];
        let row = conditional_row(&distances, 0, 3.0);

        assert_eq!(row[0], 0.0);
        assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        let entropy: f64 = row
            .iter()
            .filter(|&&v| v > 0.0)
            .map(|&v| -v * v.ln())
            .sum();
        assert!((entropy.exp() - 3.0).abs() < 1e-3, "perplexity={}", entropy.exp());
    }

    #[test]
    fn test_joint_probabilities_are_symmetric() {
        let data = two_clusters();
        let n = data.len();
        let p = joint_probabilities(&squared_distances(&data), n, 5.0);
        for i in 0..n {
            assert_eq!(p[i * n + i], 0.0);
            for j in 0..n {
                assert!((p[i * n + j] - p[j * n + i]).abs() < 1e-15);
            }
        }
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_ignores_stale_buffers() {
        let data = two_clusters();
        let n = data.len();
        let p = joint_probabilities(&squared_distances(&data), n, 5.0);
        let y: Vec<Coordinate> = (0..n).map(|i| [i as f64 * 0.1, (i % 3) as f64]).collect();

        let mut kernel = vec![0.0f64; n * n];
        let mut fresh = vec![[0.0f64; 2]; n];
        gradient(&p, &y, 4.0, &mut kernel, &mut fresh);

        kernel.fill(7.0);
        let mut stale = vec![[-3.0f64; 2]; n];
        gradient(&p, &y, 4.0, &mut kernel, &mut stale);
        assert_eq!(fresh, stale);

        // Pairwise forces cancel, so the total gradient is zero
        let total = fresh.iter().fold([0.0, 0.0], |acc, g| [acc[0] + g[0], acc[1] + g[1]]);
        assert!(total[0].abs() < 1e-9 && total[1].abs() < 1e-9, "{total:?}");
    }

    #[test]
    fn test_tsne_separates_clusters() {
        let coords = Tsne::new(quick_config(), 42)
            .fit_transform(&two_clusters())
            .unwrap();
        assert_eq!(coords.len(), 20);

        for (i, point) in coords.iter().enumerate() {
            let nearest = coords
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .min_by(|(_, a), (_, b)| {
                    let da = (a[0] - point[0]).powi(2) + (a[1] - point[1]).powi(2);
                    let db = (b[0] - point[0]).powi(2) + (b[1] - point[1]).powi(2);
                    da.total_cmp(&db)
                })
                .map(|(j, _)| j)
                .unwrap();
            assert_eq!(i < 10, nearest < 10, "point {i} landed next to {nearest}");
        }
    }

    #[test]
    fn test_tsne_fixed_seed_is_reproducible() {
        let data = two_clusters();
        let a = Tsne::new(quick_config(), 3).fit_transform(&data).unwrap();
        let b = Tsne::new(quick_config(), 3).fit_transform(&data).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|p| p[0].is_finite() && p[1].is_finite()));
    }

    #[test]
    fn test_tsne_minimum_samples() {
        let three = EmbeddingMatrix::new(vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        let coords = Tsne::new(quick_config(), 42).project(&three).unwrap();
        assert_eq!(coords.len(), 3);
        assert!(coords.iter().all(|p| p[0].is_finite() && p[1].is_finite()));

        let two = EmbeddingMatrix::new(vec![vec![0.0, 0.0], vec![1.0, 0.0]]).unwrap();
        assert!(matches!(
            Tsne::new(quick_config(), 42).project(&two),
            Err(PipelineError::InsufficientSamples { n: 2, required: 3, .. })
        ));
    }
}
