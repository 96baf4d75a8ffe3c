//! Error taxonomy for sweep preparation and execution.
//!
//! Two layers:
//! - [`CaseError`] is recorded in a single case's result slot and never
//!   crosses case boundaries.
//! - [`SweepError`] is batch-level: configuration that prevents the batch from
//!   being assembled at all, or an invariant break inside the runner.

use serde::{Deserialize, Serialize};

/// Failure of a single case. Stored in the case's result slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("preparation error: {reason}")]
    Preparation { reason: String },

    #[error("solver exited with {}: {excerpt}", describe_exit(.exit_code))]
    SolverExecution {
        exit_code: Option<i32>,
        excerpt: String,
    },

    #[error("solver timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code".to_string(),
    }
}

impl CaseError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn preparation(reason: impl Into<String>) -> Self {
        Self::Preparation {
            reason: reason.into(),
        }
    }

    /// Exit code of the solver process, when one was observed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::SolverExecution { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

/// Batch-level errors.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("invalid sweep configuration: {0}")]
    Configuration(String),

    /// The runner broke one of its own invariants; the batch result is unusable.
    #[error("batch aggregation failed: {detail}")]
    Aggregation { detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for batch-level operations.
pub type SweepResult<T> = std::result::Result<T, SweepError>;
