//! The preprocessing pipeline.
//!
//! # Architecture
//! ```text
//! Dataset ──┬── MultiMetricComputer ──┐
//!           └── ProjectionEngine ─────┴── RecordAssembler ── Vec<ObjectRecord>
//! ```
//! The neighbor and projection branches are independent and run concurrently
//! with `rayon::join` inside a dedicated thread pool. Every input-shape and
//! sample-size check runs before any computation starts, so a rejected run does
//! no work.

mod assembler;
mod record;
mod rounding;

pub use assembler::RecordAssembler;
pub use record::ObjectRecord;
pub use rounding::Rounder;

use crate::config::Settings;
use crate::error::{PipelineError, PipelineResult};
use crate::neighbors::MultiMetricComputer;
use crate::projection::ProjectionEngine;
use crate::types::Dataset;
use std::time::Instant;
use tracing::info;

pub struct Pipeline {
    neighbors: MultiMetricComputer,
    projections: ProjectionEngine,
    assembler: RecordAssembler,
    threads: usize,
}

impl Pipeline {
    /// Builds every stage from validated settings.
    pub fn from_settings(settings: &Settings) -> PipelineResult<Self> {
        settings.validate()?;
        Ok(Self {
            neighbors: MultiMetricComputer::new(
                settings.neighbors.metrics.clone(),
                settings.neighbors.max_k,
            )?,
            projections: ProjectionEngine::from_config(&settings.projection, settings.seed)?,
            assembler: RecordAssembler::new(
                settings.output.precision,
                settings.output.include_embedding,
            ),
            threads: settings.parallel_threads,
        })
    }

    /// Checks the dataset against every stage without computing anything.
    pub fn validate(&self, dataset: &Dataset) -> PipelineResult<()> {
        let n = dataset.len();
        self.neighbors.validate(n)?;
        self.projections.validate(n)
    }

    /// Runs the whole pipeline and returns one record per object, in input order.
    pub fn run(&self, dataset: &Dataset) -> PipelineResult<Vec<ObjectRecord>> {
        self.validate(dataset)?;

        let matrix = dataset.embeddings();
        info!(
            n = matrix.len(),
            dim = matrix.dimension(),
            metrics = ?self.neighbors.metrics(),
            methods = ?self.projections.methods(),
            threads = self.threads,
            "pipeline started"
        );
        let start = Instant::now();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| PipelineError::ThreadPool {
                reason: e.to_string(),
            })?;

        let (neighborhoods, projections) = pool.install(|| {
            rayon::join(
                || self.neighbors.compute(matrix),
                || self.projections.run(matrix),
            )
        });
        let records = self.assembler.assemble(dataset, neighborhoods?, projections?)?;

        info!(
            records = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        Ok(records)
    }
}
