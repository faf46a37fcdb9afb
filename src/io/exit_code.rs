//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success
//! - `1`: General error - unspecified failure
//! - `3-125`: Specific errors scripts can react to
//! - `126-255`: Reserved by shell

use crate::error::PipelineError;

/// Standard exit codes for CLI operations.
///
/// These codes follow Unix conventions where 0 indicates success,
/// and non-zero values indicate various error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Malformed embeddings, metadata or preprocessed file (code 4)
    ParseError = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Input data or options have the wrong shape (code 9)
    InvalidInput = 9,

    /// A method cannot operate on the sample size (code 10)
    NumericalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Convert a `PipelineError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_error(error: &PipelineError) -> Self {
        match error {
            PipelineError::Parse { .. } | PipelineError::Serialization(_) => ExitCode::ParseError,
            PipelineError::FileRead { .. } | PipelineError::FileWrite { .. } => ExitCode::IoError,
            PipelineError::Config { .. } => ExitCode::ConfigError,
            PipelineError::DatasetMismatch { .. } => ExitCode::InvalidInput,
            e if e.is_input_shape() => ExitCode::InvalidInput,
            e if e.is_numerical() => ExitCode::NumericalError,

            // Everything else is a general error
            _ => ExitCode::GeneralError,
        }
    }
}
