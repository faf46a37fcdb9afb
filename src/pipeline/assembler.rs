//! Merges labels, neighbor lists and projections into output records.
//!
//! This is the only place rounding is applied: every distance, coordinate and
//! optional raw embedding value passes through the [`Rounder`] exactly once.

use crate::error::{PipelineError, PipelineResult};
use crate::neighbors::NeighborhoodMap;
use crate::pipeline::record::ObjectRecord;
use crate::pipeline::rounding::Rounder;
use crate::projection::Projection;
use crate::types::Dataset;

#[derive(Debug, Clone, Copy)]
pub struct RecordAssembler {
    rounder: Rounder,
    include_embedding: bool,
}

impl RecordAssembler {
    #[must_use]
    pub fn new(precision: u32, include_embedding: bool) -> Self {
        Self {
            rounder: Rounder::new(precision),
            include_embedding,
        }
    }

    #[must_use]
    pub fn rounder(&self) -> Rounder {
        self.rounder
    }

    /// One record per object, in input order.
    ///
    /// Every stage output must hold exactly one entry per object; a mismatch is
    /// an internal error since upstream stages guarantee it.
    pub fn assemble(
        &self,
        dataset: &Dataset,
        neighborhoods: Vec<NeighborhoodMap>,
        projections: Vec<Projection>,
    ) -> PipelineResult<Vec<ObjectRecord>> {
        let n = dataset.len();
        if neighborhoods.len() != n {
            return Err(PipelineError::Internal {
                reason: format!(
                    "{} neighborhood maps for {n} objects",
                    neighborhoods.len()
                ),
            });
        }
        if let Some(short) = projections.iter().find(|p| p.coordinates.len() != n) {
            return Err(PipelineError::Internal {
                reason: format!(
                    "{} has {} coordinates for {n} objects",
                    short.method,
                    short.coordinates.len()
                ),
            });
        }

        let rounder = self.rounder;
        let records = neighborhoods
            .into_iter()
            .enumerate()
            .map(|(index, neighbors)| ObjectRecord {
                index,
                label: dataset.labels()[index].clone(),
                embedding: self
                    .include_embedding
                    .then(|| rounder.round_slice(dataset.embeddings().row(index))),
                neighbors: neighbors.map_distances(|d| rounder.round(d)),
                projections: projections
                    .iter()
                    .map(|p| (p.method, rounder.round_coordinate(p.coordinates[index])))
                    .collect(),
            })
            .collect();

        Ok(records)
    }
}
