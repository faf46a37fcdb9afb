//! Loading embedding vectors and labels from delimited text files.
//!
//! Both files hold one entry per line. Lines are trimmed and trailing blank
//! lines are ignored. A blank line inside the embeddings file is a parse error;
//! a blank line inside the metadata file is an empty label.

use crate::error::{ErrorContext, PipelineError, PipelineResult};
use crate::types::Dataset;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Reads one vector per line, components split by `delimiter`.
pub fn load_embeddings(path: &Path, delimiter: &str) -> PipelineResult<Vec<Vec<f64>>> {
    let reader = open(path)?;
    let rows = parse_embeddings(reader, path, delimiter)?;
    debug!(path = %path.display(), rows = rows.len(), "loaded embeddings");
    Ok(rows)
}

/// Reads one label per line.
pub fn load_labels(path: &Path) -> PipelineResult<Vec<String>> {
    let reader = open(path)?;
    let labels = parse_labels(reader, path)?;
    debug!(path = %path.display(), labels = labels.len(), "loaded labels");
    Ok(labels)
}

/// Loads and pairs both files. Count mismatches fail here, before any computation.
pub fn load_dataset(
    embeddings_path: &Path,
    metadata_path: &Path,
    delimiter: &str,
) -> PipelineResult<Dataset> {
    let rows = load_embeddings(embeddings_path, delimiter)?;
    let labels = load_labels(metadata_path)?;
    let dataset = Dataset::from_rows(rows, labels)?;
    info!(
        n = dataset.len(),
        dim = dataset.embeddings().dimension(),
        "dataset loaded"
    );
    Ok(dataset)
}

/// Parses embedding rows from any reader; `path` is only used in error messages.
pub fn parse_embeddings<R: BufRead>(
    reader: R,
    path: &Path,
    delimiter: &str,
) -> PipelineResult<Vec<Vec<f64>>> {
    let lines = read_trimmed_lines(reader, path)?;

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let line_number = i + 1;
            if line.is_empty() {
                return Err(parse_error(path, line_number, "empty line"));
            }
            line.split(delimiter)
                .enumerate()
                .map(|(column, field)| {
                    field.trim().parse::<f64>().map_err(|e| {
                        parse_error(
                            path,
                            line_number,
                            format!("column {}: '{}' is not a number ({e})", column + 1, field),
                        )
                    })
                })
                .collect()
        })
        .collect()
}

/// Parses labels from any reader; `path` is only used in error messages.
pub fn parse_labels<R: BufRead>(reader: R, path: &Path) -> PipelineResult<Vec<String>> {
    read_trimmed_lines(reader, path)
}

fn open(path: &Path) -> PipelineResult<BufReader<File>> {
    File::open(path).map(BufReader::new).read_context(path)
}

/// Trimmed lines with trailing blank lines dropped.
fn read_trimmed_lines<R: BufRead>(reader: R, path: &Path) -> PipelineResult<Vec<String>> {
    let mut lines = reader
        .lines()
        .map(|line| {
            line.map(|l| l.trim().to_string()).read_context(path)
        })
        .collect::<PipelineResult<Vec<String>>>()?;

    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    Ok(lines)
}

fn parse_error(path: &Path, line: usize, reason: impl Into<String>) -> PipelineError {
    PipelineError::Parse {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}
