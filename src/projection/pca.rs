//! PCA (Principal Component Analysis)
//!
//! Linear dimensionality reduction onto the two directions of largest variance.
//! Computes the top eigenvectors of the covariance matrix using power iteration
//! with deflation.
//!
//! Eigenvector signs are fixed so the largest-magnitude loading of each
//! component is positive, making the output independent of the starting vector's
//! orientation.

use crate::error::PipelineResult;
use crate::projection::{ProjectionMethod, Projector, ensure_min_samples};
use crate::types::{Coordinate, EmbeddingMatrix};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Minimum norm before a vector is treated as zero.
const EPSILON: f64 = 1e-12;

/// PCA configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    /// Subtract the per-feature mean before projecting
    pub center: bool,
    /// Scale each feature to unit variance
    pub scale: bool,
    /// Power iteration cap per component
    pub max_iterations: usize,
    /// Convergence threshold on eigenvector movement
    pub tolerance: f64,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            center: true,
            scale: false,
            max_iterations: 300,
            tolerance: 1e-10,
        }
    }
}

/// PCA result including the embedding and explained variance
#[derive(Debug, Clone, PartialEq)]
pub struct PcaResult {
    /// Projected data: one coordinate per sample
    pub embedding: Vec<Coordinate>,
    /// Explained variance ratio for each component (sums to <= 1.0)
    pub explained_variance_ratio: Vec<f64>,
    /// Eigenvalues (raw variance per component)
    pub eigenvalues: Vec<f64>,
}

/// PCA dimensionality reduction
#[derive(Debug, Clone)]
pub struct Pca {
    config: PcaConfig,
    seed: u64,
}

impl Pca {
    pub fn new(config: PcaConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    /// Run PCA and keep the variance statistics alongside the 2D embedding.
    pub fn fit_transform(&self, matrix: &EmbeddingMatrix) -> PipelineResult<PcaResult> {
        let n = matrix.len();
        ensure_min_samples(ProjectionMethod::Pca, n)?;

        let d = matrix.dimension();
        let n_components = d.min(2);

        let centered = self.center_and_scale(matrix);
        let cov = compute_covariance(&centered, d);
        let (eigenvalues, eigenvectors) = self.power_iteration(&cov, d, n_components);

        let full_variance: f64 = (0..d).map(|i| cov[i * d + i]).sum::<f64>().max(EPSILON);
        let explained_variance_ratio: Vec<f64> = eigenvalues
            .iter()
            .map(|&ev| (ev / full_variance).max(0.0))
            .collect();

        let embedding: Vec<Coordinate> = centered
            .par_iter()
            .map(|sample| {
                let mut point = [0.0f64; 2];
                for (c, component) in eigenvectors.iter().enumerate() {
                    point[c] = dot(sample, component);
                }
                point
            })
            .collect();

        debug!(
            n,
            dim = d,
            explained_variance = ?explained_variance_ratio,
            "pca finished"
        );

        Ok(PcaResult {
            embedding,
            explained_variance_ratio,
            eigenvalues,
        })
    }

    /// Center data (subtract mean) and optionally scale to unit variance.
    fn center_and_scale(&self, matrix: &EmbeddingMatrix) -> Vec<Vec<f64>> {
        let n = matrix.len() as f64;
        let d = matrix.dimension();

        let means: Vec<f64> = if self.config.center {
            (0..d)
                .map(|j| matrix.rows().iter().map(|row| row[j]).sum::<f64>() / n)
                .collect()
        } else {
            vec![0.0; d]
        };

        let stds: Vec<f64> = if self.config.scale {
            (0..d)
                .map(|j| {
                    let var = matrix
                        .rows()
                        .iter()
                        .map(|row| (row[j] - means[j]).powi(2))
                        .sum::<f64>()
                        / (n - 1.0).max(1.0);
                    let std = var.sqrt();
                    if std < EPSILON { 1.0 } else { std }
                })
                .collect()
        } else {
            vec![1.0; d]
        };

        matrix
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, &val)| (val - means[j]) / stds[j])
                    .collect()
            })
            .collect()
    }

    /// Power iteration with deflation to extract top-k eigenvectors.
    fn power_iteration(&self, cov: &[f64], d: usize, k: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
        let mut eigenvalues = Vec::with_capacity(k);
        let mut eigenvectors: Vec<Vec<f64>> = Vec::with_capacity(k);

        // Work on a copy so we can deflate
        let mut work = cov.to_vec();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        for _component in 0..k {
            let mut v: Vec<f64> = (0..d).map(|_| rng.random_range(-1.0..1.0)).collect();
            orthogonalize(&mut v, &eigenvectors);
            let norm = dot(&v, &v).sqrt().max(EPSILON);
            v.iter_mut().for_each(|x| *x /= norm);

            let mut eigenvalue = 0.0f64;

            for _iter in 0..self.config.max_iterations {
                let mut w: Vec<f64> = (0..d)
                    .map(|i| dot(&work[i * d..(i + 1) * d], &v))
                    .collect();
                // Deflation leaves rounding noise along earlier components
                orthogonalize(&mut w, &eigenvectors);

                let new_eigenvalue = dot(&v, &w);
                let w_norm = dot(&w, &w).sqrt();
                if w_norm < EPSILON {
                    // Remaining variance is zero; any unit vector is an eigenvector
                    eigenvalue = 0.0;
                    break;
                }
                let new_v: Vec<f64> = w.iter().map(|&x| x / w_norm).collect();

                let diff: f64 = v
                    .iter()
                    .zip(&new_v)
                    .map(|(&a, &b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();

                v = new_v;
                eigenvalue = new_eigenvalue;

                if diff < self.config.tolerance {
                    break;
                }
            }

            orient(&mut v);
            eigenvalue = eigenvalue.max(0.0);

            // Deflate: A = A - eigenvalue * v * v^T
            for i in 0..d {
                for j in 0..d {
                    work[i * d + j] -= eigenvalue * v[i] * v[j];
                }
            }

            eigenvalues.push(eigenvalue);
            eigenvectors.push(v);
        }

        (eigenvalues, eigenvectors)
    }
}

impl Projector for Pca {
    fn method(&self) -> ProjectionMethod {
        ProjectionMethod::Pca
    }

    fn project(&self, matrix: &EmbeddingMatrix) -> PipelineResult<Vec<Coordinate>> {
        Ok(self.fit_transform(matrix)?.embedding)
    }
}

/// Sample covariance (d x d) stored as a flat row-major Vec.
///
/// Rows of the result are computed in parallel; every entry is a sequential sum,
/// so the value does not depend on the thread count.
fn compute_covariance(data: &[Vec<f64>], d: usize) -> Vec<f64> {
    let n = data.len() as f64;
    let columns: Vec<Vec<f64>> = (0..d)
        .map(|j| data.iter().map(|row| row[j]).collect())
        .collect();

    let upper: Vec<Vec<f64>> = (0..d)
        .into_par_iter()
        .map(|i| {
            (i..d)
                .map(|j| dot(&columns[i], &columns[j]) / (n - 1.0).max(1.0))
                .collect()
        })
        .collect();

    let mut cov = vec![0.0f64; d * d];
    for (i, row) in upper.iter().enumerate() {
        for (offset, &val) in row.iter().enumerate() {
            let j = i + offset;
            cov[i * d + j] = val;
            cov[j * d + i] = val;
        }
    }
    cov
}

/// Remove from `v` its projection onto each (unit) vector in `basis`.
fn orthogonalize(v: &mut [f64], basis: &[Vec<f64>]) {
    for b in basis {
        let overlap = dot(v, b);
        v.iter_mut().zip(b).for_each(|(x, &y)| *x -= overlap * y);
    }
}

/// Flip `v` so its largest-magnitude entry is positive.
fn orient(v: &mut [f64]) {
    let pivot = v
        .iter()
        .copied()
        .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 {
        v.iter_mut().for_each(|x| *x = -*x);
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
