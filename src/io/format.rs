//! The `--json` envelope printed by `embcmp preprocess` and `embcmp compare`.
//!
//! Success carries the run summary or comparison report under `data`. Failure
//! carries the error's status code, its recovery suggestions, and the exit code
//! the process is about to return, so a script can branch on either.

use crate::error::PipelineError;
use crate::io::exit_code::ExitCode;
use serde::{Deserialize, Serialize};

/// How a command reports its result on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Styled text (default)
    Text,
    /// One `JsonResponse` per invocation
    Json,
}

impl OutputFormat {
    /// `--json` selects JSON.
    #[must_use]
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Envelope around a command result or a `PipelineError`.
///
/// `data` and `error` are mutually exclusive; `exit_code` always matches the
/// process exit status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse<T = serde_json::Value>
where
    T: Serialize,
{
    /// "success" or "error"
    pub status: String,

    /// "OK", or `PipelineError::status_code` such as "COUNT_MISMATCH"
    pub code: String,

    /// The error's Display text on failure
    pub message: String,

    /// `PreprocessSummary` or `ComparisonReport`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Present only on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,

    /// Same value as the process exit status
    pub exit_code: u8,

    /// Crate version and elapsed time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// From `PipelineError::recovery_suggestions`
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// `embedding-comparator` package version
    pub version: String,
    /// Wall time of the whole command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ResponseMeta {
    #[must_use]
    pub fn current(execution_time_ms: Option<u64>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            execution_time_ms,
        }
    }
}

impl<T> JsonResponse<T>
where
    T: Serialize,
{
    /// Wraps a finished command's payload.
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            code: "OK".to_string(),
            message: "Operation completed successfully".to_string(),
            data: Some(data),
            error: None,
            exit_code: ExitCode::Success as u8,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl JsonResponse<serde_json::Value> {
    /// Reports a failed command; the exit code follows `ExitCode::from_error`.
    pub fn from_error(error: &PipelineError) -> Self {
        Self {
            status: "error".to_string(),
            code: error.status_code(),
            message: error.to_string(),
            data: None,
            error: Some(ErrorDetails {
                suggestions: error
                    .recovery_suggestions()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
            exit_code: ExitCode::from_error(error) as u8,
            meta: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_flag() {
        assert_eq!(OutputFormat::from_json_flag(true), OutputFormat::Json);
        assert_eq!(OutputFormat::from_json_flag(false), OutputFormat::Text);
    }

    #[test]
    fn test_json_response_success() {
        #[derive(Serialize)]
        struct Summary {
            records: usize,
            outfile: String,
        }

        let data = Summary {
            records: 4,
            outfile: "model_a.json".to_string(),
        };

        let response = JsonResponse::success(data).with_meta(ResponseMeta::current(Some(12)));
        assert_eq!(response.status, "success");
        assert_eq!(response.code, "OK");
        assert_eq!(response.exit_code, 0);
        assert!(response.data.is_some());
        assert!(response.error.is_none());
        assert_eq!(response.meta.unwrap().execution_time_ms, Some(12));
    }

    #[test]
    fn test_json_response_from_error() {
        let error = PipelineError::CountMismatch {
            embeddings: 4,
            labels: 3,
        };
        let response = JsonResponse::from_error(&error);
        assert_eq!(response.status, "error");
        assert_eq!(response.code, "COUNT_MISMATCH");
        assert_eq!(response.exit_code, 9);
        assert!(response.data.is_none());
        assert!(!response.error.unwrap().suggestions.is_empty());
    }

    #[test]
    fn test_json_response_for_numerical_failure() {
        let error = PipelineError::NonFiniteDistance {
            metric: crate::neighbors::DistanceMetric::Euclidean,
            i: 0,
            j: 1,
        };
        let value = serde_json::to_value(JsonResponse::from_error(&error)).unwrap();
        assert_eq!(value["code"], "NON_FINITE_DISTANCE");
        assert_eq!(value["exit_code"], 10);
        assert!(value.get("data").is_none());
        assert!(value["error"]["suggestions"][0].as_str().unwrap().contains("1e150"));
    }
}
