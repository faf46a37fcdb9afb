//! Neighborhood comparison between two preprocessed datasets.
//!
//! Two embedding models preprocessed over the same label list can be compared
//! object by object: the similarity of an object is the intersection over union
//! of its first `k` neighbor indices in each dataset. Objects whose
//! neighborhoods changed the most sort first.

use crate::error::{ErrorContext, PipelineError, PipelineResult};
use crate::neighbors::{DistanceMetric, NeighborList};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// A record read back from a preprocessed output file.
///
/// Projection and embedding fields are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredRecord {
    pub idx: usize,
    pub word: String,
    pub nearest_neighbors: BTreeMap<String, NeighborList>,
}

impl StoredRecord {
    pub fn neighbors(&self, metric: DistanceMetric) -> PipelineResult<&NeighborList> {
        self.nearest_neighbors
            .get(metric.name())
            .ok_or_else(|| PipelineError::DatasetMismatch {
                reason: format!("object {} has no '{metric}' neighbors", self.idx),
            })
    }
}

/// Reads a preprocessed output file.
pub fn load_records(path: &Path) -> PipelineResult<Vec<StoredRecord>> {
    let reader = BufReader::new(File::open(path).read_context(path)?);
    let records = serde_json::from_reader::<_, Vec<StoredRecord>>(reader).read_context(path)?;
    debug!(path = %path.display(), records = records.len(), "loaded preprocessed records");
    Ok(records)
}

/// Fails unless both datasets hold the same labels in the same order.
pub fn check_dataset_orders_equal(a: &[StoredRecord], b: &[StoredRecord]) -> PipelineResult<()> {
    if a.is_empty() {
        return Err(mismatch("datasets are empty"));
    }
    if a.len() != b.len() {
        return Err(mismatch(format!(
            "dataset lengths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    if let Some((i, (ra, rb))) = a
        .iter()
        .zip(b)
        .enumerate()
        .find(|(_, (ra, rb))| ra.word != rb.word)
    {
        return Err(mismatch(format!(
            "labels differ at index {i} ('{}' vs '{}'); both datasets need the same order",
            ra.word, rb.word
        )));
    }
    Ok(())
}

/// Per-object IoU of the first `k` neighbor indices under `metric`.
///
/// Requires `1 <= k <= ` the stored neighbor count of every object.
pub fn iou_similarities(
    a: &[StoredRecord],
    b: &[StoredRecord],
    k: usize,
    metric: DistanceMetric,
) -> PipelineResult<Vec<f64>> {
    check_dataset_orders_equal(a, b)?;
    if k == 0 {
        return Err(PipelineError::InvalidInput {
            reason: "k must be at least 1".to_string(),
        });
    }

    a.iter()
        .zip(b)
        .map(|(ra, rb)| {
            let na = ra.neighbors(metric)?.indices();
            let nb = rb.neighbors(metric)?.indices();
            let available = na.len().min(nb.len());
            if k > available {
                return Err(PipelineError::InvalidInput {
                    reason: format!(
                        "k={k} exceeds the {available} stored neighbors of object {}",
                        ra.idx
                    ),
                });
            }
            Ok(iou(&na[..k], &nb[..k]))
        })
        .collect()
}

/// Object indices ordered from least to most similar; ties keep index order.
#[must_use]
pub fn sort_by_similarity(similarities: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..similarities.len()).collect();
    order.sort_by(|&i, &j| similarities[i].total_cmp(&similarities[j]));
    order
}

/// Largest neighbor distance across `datasets`, used to scale distance displays.
///
/// Cosine distances are reported against a fixed maximum of 1.
pub fn max_neighbor_distance(
    datasets: &[&[StoredRecord]],
    metric: DistanceMetric,
) -> PipelineResult<f64> {
    if metric == DistanceMetric::Cosine {
        return Ok(1.0);
    }
    let mut max = 0.0_f64;
    for record in datasets.iter().flat_map(|dataset| dataset.iter()) {
        for &distance in record.neighbors(metric)?.distances() {
            max = max.max(distance);
        }
    }
    Ok(max)
}

fn iou(a: &[usize], b: &[usize]) -> f64 {
    let set_a: HashSet<usize> = a.iter().copied().collect();
    let set_b: HashSet<usize> = b.iter().copied().collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 1.0;
    }
    set_a.intersection(&set_b).count() as f64 / union as f64
}

fn mismatch(reason: impl Into<String>) -> PipelineError {
    PipelineError::DatasetMismatch {
        reason: reason.into(),
    }
}

/// One row of a comparison report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSimilarity {
    pub idx: usize,
    pub word: String,
    pub similarity: f64,
}

/// Objects of two datasets ranked from least to most similar neighborhoods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub metric: DistanceMetric,
    pub k: usize,
    pub mean_similarity: f64,
    pub objects: Vec<ObjectSimilarity>,
}

impl ComparisonReport {
    /// Compares `a` against `b` and ranks every object.
    pub fn build(
        a: &[StoredRecord],
        b: &[StoredRecord],
        k: usize,
        metric: DistanceMetric,
    ) -> PipelineResult<Self> {
        let similarities = iou_similarities(a, b, k, metric)?;
        let mean_similarity = similarities.iter().sum::<f64>() / similarities.len() as f64;
        let objects = sort_by_similarity(&similarities)
            .into_iter()
            .map(|i| ObjectSimilarity {
                idx: a[i].idx,
                word: a[i].word.clone(),
                similarity: similarities[i],
            })
            .collect();

        Ok(Self {
            metric,
            k,
            mean_similarity,
            objects,
        })
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Neighborhood similarity ({}, k={}): mean {:.2} over {} objects",
            self.metric,
            self.k,
            self.mean_similarity,
            self.objects.len()
        )?;
        writeln!(f, "{}", "=".repeat(40))?;
        for object in &self.objects {
            writeln!(f, "{:>8.2}  {:>6}  {}", object.similarity, object.idx, object.word)?;
        }
        Ok(())
    }
}
