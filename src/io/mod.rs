//! Input/Output handling for the CLI and the pipeline's file collaborators.
//!
//! This module provides:
//! - Loading embeddings and labels from delimited text files
//! - Atomic JSON record output
//! - Unified message formatting (text, JSON)
//! - Consistent exit codes

pub mod exit_code;
pub mod format;
pub mod input;
pub mod output;

pub use exit_code::ExitCode;
pub use format::{ErrorDetails, JsonResponse, OutputFormat, ResponseMeta};
pub use input::{load_dataset, load_embeddings, load_labels};
pub use output::{OutputManager, write_records};
