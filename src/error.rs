//! Error taxonomy for the remapping workflow.
//!
//! Cache misses are not errors; the store reports them as `None`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemapError {
    /// The oracle's correspondence reply is not a structured literal.
    #[error("Could not parse oracle reply as a column map: {reason}")]
    Parse { reason: String, raw: String },

    /// An interactive pick that is not one of the offered options.
    #[error("The choice '{choice}' for column '{column}' is not in the list {candidates:?}")]
    InvalidChoice {
        column: String,
        choice: String,
        candidates: Vec<String>,
    },

    /// The assembled mapping program failed while running.
    #[error("Mapping program failed: {0}")]
    Execution(String),

    #[error("Persisting {path:?} failed: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Oracle request failed: {0}")]
    Oracle(String),

    #[error("Coding agent stopped after {iterations} iteration(s) without a final answer")]
    Agent { iterations: usize },

    #[error("Cannot {action} while the workflow is {stage}")]
    Stage { action: &'static str, stage: String },

    #[error("Dataset '{name}' is unusable: {reason}")]
    Dataset { name: String, reason: String },
}

impl RemapError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RemapError::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn is_invalid_choice(&self) -> bool {
        matches!(self, RemapError::InvalidChoice { .. })
    }
}

pub type RemapResult<T> = std::result::Result<T, RemapError>;
