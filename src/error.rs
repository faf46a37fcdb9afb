//! Error types for the embedding preprocessing pipeline
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::neighbors::DistanceMetric;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// File system errors
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed input file content
    #[error("Failed to parse '{path}' at line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Input-shape errors
    #[error("Label count ({labels}) does not match embedding count ({embeddings})")]
    CountMismatch { embeddings: usize, labels: usize },

    #[error("Invalid embedding matrix: {reason}")]
    InvalidMatrix { reason: String },

    #[error("max_k must satisfy 0 < max_k < N (got max_k={max_k}, N={n})")]
    InvalidMaxK { max_k: usize, n: usize },

    #[error("Unsupported distance metric '{name}'. Supported metrics: {supported}")]
    UnsupportedMetric { name: String, supported: String },

    #[error("Unsupported projection method '{name}'. Supported methods: {supported}")]
    UnsupportedProjection { name: String, supported: String },

    #[error("Invalid pipeline input: {reason}")]
    InvalidInput { reason: String },

    /// Numerical-degeneracy errors
    #[error("{method} requires at least {required} samples, got {n}")]
    InsufficientSamples {
        method: String,
        n: usize,
        required: usize,
    },

    #[error("{metric} distance between objects {i} and {j} is not finite")]
    NonFiniteDistance {
        metric: DistanceMetric,
        i: usize,
        j: usize,
    },

    #[error("{method} produced a non-finite coordinate for object {index}")]
    NonFiniteCoordinate { method: String, index: usize },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Output encoding errors
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Two preprocessed datasets cannot be compared
    #[error("Datasets cannot be compared: {reason}")]
    DatasetMismatch { reason: String },

    /// Worker pool construction failed
    #[error("Failed to build worker pool: {reason}")]
    ThreadPool { reason: String },

    /// Stage outputs disagree with each other
    #[error("Internal invariant violated: {reason}")]
    Internal { reason: String },
}

impl PipelineError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::FileWrite { .. } => "FILE_WRITE_ERROR",
            Self::Parse { .. } => "PARSE_ERROR",
            Self::CountMismatch { .. } => "COUNT_MISMATCH",
            Self::InvalidMatrix { .. } => "INVALID_MATRIX",
            Self::InvalidMaxK { .. } => "INVALID_MAX_K",
            Self::UnsupportedMetric { .. } => "UNSUPPORTED_METRIC",
            Self::UnsupportedProjection { .. } => "UNSUPPORTED_PROJECTION",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InsufficientSamples { .. } => "INSUFFICIENT_SAMPLES",
            Self::NonFiniteDistance { .. } => "NON_FINITE_DISTANCE",
            Self::NonFiniteCoordinate { .. } => "NON_FINITE_COORDINATE",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::DatasetMismatch { .. } => "DATASET_MISMATCH",
            Self::ThreadPool { .. } => "THREAD_POOL_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
        .to_string()
    }

    /// True for errors caused by the shape of the input data or its options.
    #[must_use]
    pub fn is_input_shape(&self) -> bool {
        matches!(
            self,
            Self::CountMismatch { .. }
                | Self::InvalidMatrix { .. }
                | Self::InvalidMaxK { .. }
                | Self::UnsupportedMetric { .. }
                | Self::UnsupportedProjection { .. }
                | Self::InvalidInput { .. }
        )
    }

    /// True when a method cannot operate on the input numerically.
    #[must_use]
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            Self::InsufficientSamples { .. }
                | Self::NonFiniteDistance { .. }
                | Self::NonFiniteCoordinate { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the path points to a file, not a directory",
            ],
            Self::FileWrite { .. } => vec![
                "Check that the output directory exists and is writable",
                "Check available disk space",
            ],
            Self::Parse { .. } => vec![
                "Embedding files need one vector per line with delimiter-separated numbers",
                "Check the [input] delimiter setting matches the file",
            ],
            Self::CountMismatch { .. } => vec![
                "The metadata file needs exactly one label per embedding line",
                "Check both files were exported from the same model run",
            ],
            Self::InvalidMaxK { .. } => vec![
                "Lower --max-k below the number of embeddings",
                "Set neighbors.max_k in .embcmp/settings.toml",
            ],
            Self::UnsupportedMetric { .. } | Self::UnsupportedProjection { .. } => {
                vec!["Run 'embcmp config' to see the active settings"]
            }
            Self::InsufficientSamples { .. } => vec![
                "Provide more embeddings or remove the method from projection.methods",
            ],
            Self::NonFiniteDistance { .. } | Self::NonFiniteCoordinate { .. } => vec![
                "Rescale or normalize the embeddings so component magnitudes stay well below 1e150",
            ],
            Self::Config { .. } => vec![
                "Run 'embcmp init --force' to regenerate a valid settings file",
                "Check EC_* environment variables for typos",
            ],
            Self::DatasetMismatch { .. } => vec![
                "Both files must be preprocessed from the same label list in the same order",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Attaches the file path to I/O and JSON failures.
pub trait ErrorContext<T> {
    /// Failure while reading or decoding `path`.
    fn read_context(self, path: &Path) -> PipelineResult<T>;

    /// Failure while writing or encoding `path`.
    fn write_context(self, path: &Path) -> PipelineResult<T>;
}

impl<T> ErrorContext<T> for Result<T, std::io::Error> {
    fn read_context(self, path: &Path) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_context(self, path: &Path) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<T> ErrorContext<T> for Result<T, serde_json::Error> {
    fn read_context(self, path: &Path) -> PipelineResult<T> {
        self.map_err(|e| {
            if e.is_io() {
                return PipelineError::FileRead {
                    path: path.to_path_buf(),
                    source: e.into(),
                };
            }
            PipelineError::Parse {
                path: path.to_path_buf(),
                line: e.line(),
                reason: e.to_string(),
            }
        })
    }

    fn write_context(self, path: &Path) -> PipelineResult<T> {
        self.map_err(|e| {
            if e.is_io() {
                return PipelineError::FileWrite {
                    path: path.to_path_buf(),
                    source: e.into(),
                };
            }
            PipelineError::Serialization(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = PipelineError::InvalidMaxK { max_k: 5, n: 5 };
        assert!(err.is_input_shape());
        assert!(!err.is_numerical());
        assert_eq!(err.status_code(), "INVALID_MAX_K");

        let err = PipelineError::InsufficientSamples {
            method: "umap".to_string(),
            n: 2,
            required: 3,
        };
        assert!(err.is_numerical());
        assert!(!err.is_input_shape());
        assert_eq!(err.to_string(), "umap requires at least 3 samples, got 2");
    }

    #[test]
    fn test_non_finite_errors_are_numerical() {
        let err = PipelineError::NonFiniteDistance {
            metric: DistanceMetric::Euclidean,
            i: 0,
            j: 2,
        };
        assert!(err.is_numerical());
        assert!(!err.is_input_shape());
        assert!(err.to_string().starts_with("euclidean distance between objects 0 and 2"));

        let err = PipelineError::NonFiniteCoordinate {
            method: "pca".to_string(),
            index: 1,
        };
        assert!(err.is_numerical());
        assert_eq!(err.status_code(), "NON_FINITE_COORDINATE");
    }

    #[test]
    fn test_io_context_carries_path() {
        let path = Path::new("out/records.json");
        let result: Result<(), std::io::Error> = Err(std::io::Error::other("disk full"));
        match result.write_context(path).unwrap_err() {
            PipelineError::FileWrite { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }

        let result: Result<(), std::io::Error> =
            Err(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(
            result.read_context(path),
            Err(PipelineError::FileRead { .. })
        ));
    }

    #[test]
    fn test_json_read_context_reports_line() {
        let path = Path::new("a.json");
        let result: Result<serde_json::Value, _> = serde_json::from_str("[\n{\"idx\": 0,\n}");
        match result.read_context(path).unwrap_err() {
            PipelineError::Parse { path: p, line, .. } => {
                assert_eq!(p, path);
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
