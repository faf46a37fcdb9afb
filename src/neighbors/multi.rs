//! Runs the neighbor index once per configured metric and regroups the results
//! per object.

use crate::error::{PipelineError, PipelineResult};
use crate::neighbors::index::{NeighborIndex, NeighborList, validate_max_k};
use crate::neighbors::metric::DistanceMetric;
use crate::types::EmbeddingMatrix;
use rayon::prelude::*;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::time::Instant;
use tracing::{debug, info};

/// One object's neighbor lists keyed by metric, in configuration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NeighborhoodMap {
    entries: Vec<(DistanceMetric, NeighborList)>,
}

impl NeighborhoodMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, metric: DistanceMetric, list: NeighborList) {
        self.entries.push((metric, list));
    }

    #[must_use]
    pub fn get(&self, metric: DistanceMetric) -> Option<&NeighborList> {
        self.entries
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, list)| list)
    }

    /// Metrics in configuration order.
    pub fn metrics(&self) -> impl Iterator<Item = DistanceMetric> + '_ {
        self.entries.iter().map(|(metric, _)| *metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DistanceMetric, &NeighborList)> {
        self.entries.iter().map(|(metric, list)| (*metric, list))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies `f` to every distance of every list.
    #[must_use]
    pub fn map_distances(self, f: impl Fn(f64) -> f64 + Copy) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .map(|(metric, list)| (metric, list.map_distances(f)))
                .collect(),
        }
    }
}

impl Serialize for NeighborhoodMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (metric, list) in &self.entries {
            map.serialize_entry(metric.name(), list)?;
        }
        map.end()
    }
}

/// Computes neighbor lists for a fixed set of metrics.
#[derive(Debug, Clone)]
pub struct MultiMetricComputer {
    metrics: Vec<DistanceMetric>,
    max_k: usize,
}

impl MultiMetricComputer {
    /// Fails on an empty or duplicated metric list, or `max_k == 0`.
    pub fn new(metrics: Vec<DistanceMetric>, max_k: usize) -> PipelineResult<Self> {
        if metrics.is_empty() {
            return Err(PipelineError::InvalidInput {
                reason: "at least one distance metric is required".to_string(),
            });
        }
        for (position, metric) in metrics.iter().enumerate() {
            if metrics[..position].contains(metric) {
                return Err(PipelineError::InvalidInput {
                    reason: format!("distance metric '{metric}' is configured twice"),
                });
            }
        }
        if max_k == 0 {
            return Err(PipelineError::InvalidMaxK { max_k, n: 0 });
        }
        Ok(Self { metrics, max_k })
    }

    #[must_use]
    pub fn metrics(&self) -> &[DistanceMetric] {
        &self.metrics
    }

    #[must_use]
    pub fn max_k(&self) -> usize {
        self.max_k
    }

    /// Checks the configuration against a matrix of `n` rows without computing anything.
    pub fn validate(&self, n: usize) -> PipelineResult<()> {
        if n <= 1 {
            return Err(PipelineError::InvalidInput {
                reason: format!("nearest-neighbor search needs at least 2 embeddings, got {n}"),
            });
        }
        validate_max_k(self.max_k, n)
    }

    /// One `NeighborhoodMap` per row of `matrix`, index-aligned.
    pub fn compute(&self, matrix: &EmbeddingMatrix) -> PipelineResult<Vec<NeighborhoodMap>> {
        self.validate(matrix.len())?;

        let per_metric: Vec<(DistanceMetric, Vec<NeighborList>)> = self
            .metrics
            .par_iter()
            .map(|&metric| -> PipelineResult<(DistanceMetric, Vec<NeighborList>)> {
                let start = Instant::now();
                let lists = NeighborIndex::build(matrix, metric)?.all_neighbors(self.max_k)?;
                debug!(
                    metric = metric.name(),
                    n = matrix.len(),
                    k = self.max_k,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "computed neighbor lists"
                );
                Ok((metric, lists))
            })
            .collect::<PipelineResult<_>>()?;

        let mut maps = vec![NeighborhoodMap::new(); matrix.len()];
        for (metric, lists) in per_metric {
            for (map, list) in maps.iter_mut().zip(lists) {
                map.push(metric, list);
            }
        }

        info!(
            metrics = self.metrics.len(),
            n = matrix.len(),
            k = self.max_k,
            "neighborhoods ready"
        );
        Ok(maps)
    }
}
