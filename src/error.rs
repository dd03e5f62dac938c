//! Error categories for the sweep.
//!
//! A [`SweepError`] aborts the sweep. A [`QueryError`] belongs to a single
//! search call: the worker records it and moves on to its next repetition.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. Any of these stops the sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("search client is not connected to {endpoint}")]
    NotConnected { endpoint: String },

    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("configuration matrix is empty: need at least one batch size and one topK")]
    EmptyMatrix,

    #[error("vector pool holds {available} vectors but the largest batch needs {required}")]
    PoolTooSmall { required: usize, available: usize },

    #[error("vector {index} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("failed to open report {}: {source}", path.display())]
    ReportOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report: {0}")]
    ReportWrite(#[from] csv::Error),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("sweep interrupted after {completed} configuration(s)")]
    Interrupted { completed: usize },
}

impl SweepError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }
}

impl From<std::io::Error> for SweepError {
    fn from(err: std::io::Error) -> Self {
        Self::ReportWrite(csv::Error::from(err))
    }
}

/// Outcome of a single failed search call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server rejected search (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("malformed search response: {0}")]
    Malformed(String),
}
