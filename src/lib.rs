//! Preprocessing for side-by-side comparison of embedding models.
//!
//! Given an embedding matrix and one label per row, the pipeline computes the
//! nearest neighbors of every object under each configured distance metric,
//! projects the matrix to 2D with PCA, UMAP and t-SNE, and writes one rounded
//! JSON record per object. Two preprocessed datasets over the same labels can
//! then be compared by neighborhood overlap.

pub mod compare;
pub mod config;
pub mod display;
pub mod error;
pub mod io;
pub mod neighbors;
pub mod pipeline;
pub mod projection;
pub mod types;

pub use compare::{ComparisonReport, StoredRecord};
pub use config::Settings;
pub use error::{PipelineError, PipelineResult};
pub use neighbors::{DistanceMetric, MultiMetricComputer, NeighborList, NeighborhoodMap};
pub use pipeline::{ObjectRecord, Pipeline, RecordAssembler, Rounder};
pub use projection::{Projection, ProjectionEngine, ProjectionMethod, Projector};
pub use types::{Coordinate, Dataset, EmbeddingMatrix};
