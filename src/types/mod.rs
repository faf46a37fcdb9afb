//! Core data types shared by every pipeline stage.
//!
//! The embedding matrix and its labels are validated once at construction so
//! downstream stages can index rows without re-checking shape.

use crate::error::{PipelineError, PipelineResult};

/// One object's position under a 2D projection.
pub type Coordinate = [f64; 2];

/// Ordered, immutable collection of equal-length embedding vectors.
///
/// Row order is the identity of every object: index `i` here is index `i`
/// in every neighbor list, projection and output record.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: Vec<Vec<f64>>,
    dimension: usize,
}

impl EmbeddingMatrix {
    /// Creates a matrix, rejecting empty, ragged or non-finite input.
    pub fn new(rows: Vec<Vec<f64>>) -> PipelineResult<Self> {
        let Some(first) = rows.first() else {
            return Err(PipelineError::InvalidMatrix {
                reason: "embedding matrix is empty".to_string(),
            });
        };

        let dimension = first.len();
        if dimension == 0 {
            return Err(PipelineError::InvalidMatrix {
                reason: "embedding vectors have zero dimensions".to_string(),
            });
        }

        for (index, row) in rows.iter().enumerate() {
            if row.len() != dimension {
                return Err(PipelineError::InvalidMatrix {
                    reason: format!(
                        "row {index} has {} dimensions, expected {dimension}",
                        row.len()
                    ),
                });
            }
            if let Some(position) = row.iter().position(|value| !value.is_finite()) {
                return Err(PipelineError::InvalidMatrix {
                    reason: format!("row {index} has a non-finite value at position {position}"),
                });
            }
        }

        Ok(Self { rows, dimension })
    }

    /// Number of vectors (N).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always false for a constructed matrix.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Dimension of every vector (D).
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

/// Embedding matrix plus its index-aligned labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    embeddings: EmbeddingMatrix,
    labels: Vec<String>,
}

impl Dataset {
    /// Pairs embeddings with labels. Fails when the counts differ.
    pub fn new(embeddings: EmbeddingMatrix, labels: Vec<String>) -> PipelineResult<Self> {
        if embeddings.len() != labels.len() {
            return Err(PipelineError::CountMismatch {
                embeddings: embeddings.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { embeddings, labels })
    }

    /// Convenience constructor for raw rows.
    pub fn from_rows(rows: Vec<Vec<f64>>, labels: Vec<String>) -> PipelineResult<Self> {
        Self::new(EmbeddingMatrix::new(rows)?, labels)
    }

    #[must_use]
    pub fn embeddings(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
