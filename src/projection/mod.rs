//! 2D projections of the full embedding matrix.
//!
//! Each [`Projector`] is a pure function of the matrix (plus its configuration
//! and seed) returning exactly one coordinate per row, index-aligned with the
//! input. The [`ProjectionEngine`] runs the configured projectors independently
//! and returns their results in configuration order.
//!
//! UMAP and t-SNE are stochastic. They draw all randomness from a `ChaCha8Rng`
//! seeded by the configured seed, so a fixed seed reproduces the same layout.
//! Changing the seed changes the layout.

mod pca;
mod tsne;
mod umap;

pub use pca::{Pca, PcaConfig, PcaResult};
pub use tsne::{Tsne, TsneConfig};
pub use umap::{Umap, UmapConfig};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Coordinate, EmbeddingMatrix};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info};

/// Supported projection algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMethod {
    Pca,
    Umap,
    Tsne,
}

impl ProjectionMethod {
    pub const ALL: [ProjectionMethod; 3] = [
        ProjectionMethod::Pca,
        ProjectionMethod::Umap,
        ProjectionMethod::Tsne,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pca => "pca",
            Self::Umap => "umap",
            Self::Tsne => "tsne",
        }
    }

    /// Record field holding this method's coordinate, e.g. `embedding_pca`.
    #[must_use]
    pub fn output_key(&self) -> String {
        format!("embedding_{}", self.name())
    }

    /// Fewest samples the method can operate on.
    #[must_use]
    pub fn min_samples(&self) -> usize {
        match self {
            Self::Pca => 2,
            Self::Umap | Self::Tsne => 3,
        }
    }

    #[must_use]
    pub fn supported_names() -> String {
        Self::ALL
            .iter()
            .map(|method| method.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProjectionMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pca" => Ok(Self::Pca),
            "umap" => Ok(Self::Umap),
            "tsne" | "t-sne" => Ok(Self::Tsne),
            _ => Err(PipelineError::UnsupportedProjection {
                name: s.to_string(),
                supported: Self::supported_names(),
            }),
        }
    }
}

/// Fails with a numerical-degeneracy error when `n` is below the method's minimum.
pub fn ensure_min_samples(method: ProjectionMethod, n: usize) -> PipelineResult<()> {
    let required = method.min_samples();
    if n < required {
        return Err(PipelineError::InsufficientSamples {
            method: method.name().to_string(),
            n,
            required,
        });
    }
    Ok(())
}

/// A 2D dimensionality-reduction algorithm.
pub trait Projector: Send + Sync {
    fn method(&self) -> ProjectionMethod;

    /// One coordinate per row of `matrix`, in row order.
    fn project(&self, matrix: &EmbeddingMatrix) -> PipelineResult<Vec<Coordinate>>;
}

/// Coordinates produced by one projection method.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub method: ProjectionMethod,
    pub coordinates: Vec<Coordinate>,
}

/// Which projections to run and how each one is tuned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Methods to run, in output order
    #[serde(default = "default_methods")]
    pub methods: Vec<ProjectionMethod>,
    #[serde(default)]
    pub pca: PcaConfig,
    #[serde(default)]
    pub umap: UmapConfig,
    #[serde(default)]
    pub tsne: TsneConfig,
}

fn default_methods() -> Vec<ProjectionMethod> {
    vec![ProjectionMethod::Pca]
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            methods: default_methods(),
            pca: PcaConfig::default(),
            umap: UmapConfig::default(),
            tsne: TsneConfig::default(),
        }
    }
}

/// Runs a fixed list of projectors over the embedding matrix.
pub struct ProjectionEngine {
    projectors: Vec<Box<dyn Projector>>,
}

impl ProjectionEngine {
    /// Engine over explicit projectors. Fails on an empty or duplicated list.
    pub fn new(projectors: Vec<Box<dyn Projector>>) -> PipelineResult<Self> {
        if projectors.is_empty() {
            return Err(PipelineError::InvalidInput {
                reason: "at least one projection method is required".to_string(),
            });
        }
        for (position, projector) in projectors.iter().enumerate() {
            let method = projector.method();
            if projectors[..position].iter().any(|p| p.method() == method) {
                return Err(PipelineError::InvalidInput {
                    reason: format!("projection method '{method}' is configured twice"),
                });
            }
        }
        Ok(Self { projectors })
    }

    /// Builds the standard projector for each configured method.
    pub fn from_config(config: &ProjectionConfig, seed: u64) -> PipelineResult<Self> {
        let projectors = config
            .methods
            .iter()
            .map(|method| -> Box<dyn Projector> {
                match method {
                    ProjectionMethod::Pca => Box::new(Pca::new(config.pca.clone(), seed)),
                    ProjectionMethod::Umap => Box::new(Umap::new(config.umap.clone(), seed)),
                    ProjectionMethod::Tsne => Box::new(Tsne::new(config.tsne.clone(), seed)),
                }
            })
            .collect();
        Self::new(projectors)
    }

    pub fn methods(&self) -> Vec<ProjectionMethod> {
        self.projectors.iter().map(|p| p.method()).collect()
    }

    /// Checks every method's sample minimum without computing anything.
    pub fn validate(&self, n: usize) -> PipelineResult<()> {
        self.projectors
            .iter()
            .try_for_each(|projector| ensure_min_samples(projector.method(), n))
    }

    /// Runs every projector, in parallel, returning results in configuration order.
    pub fn run(&self, matrix: &EmbeddingMatrix) -> PipelineResult<Vec<Projection>> {
        self.validate(matrix.len())?;

        let projections = self
            .projectors
            .par_iter()
            .map(|projector| -> PipelineResult<Projection> {
                let method = projector.method();
                let start = Instant::now();
                let coordinates = projector.project(matrix)?;
                if coordinates.len() != matrix.len() {
                    return Err(PipelineError::Internal {
                        reason: format!(
                            "{method} returned {} coordinates for {} embeddings",
                            coordinates.len(),
                            matrix.len()
                        ),
                    });
                }
                if let Some(index) = coordinates
                    .iter()
                    .position(|point| !point.iter().all(|c| c.is_finite()))
                {
                    return Err(PipelineError::NonFiniteCoordinate {
                        method: method.name().to_string(),
                        index,
                    });
                }
                debug!(
                    method = method.name(),
                    n = matrix.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "projection finished"
                );
                Ok(Projection {
                    method,
                    coordinates,
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        info!(methods = projections.len(), n = matrix.len(), "projections ready");
        Ok(projections)
    }
}
