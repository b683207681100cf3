use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `EpiError` and maps other errors to an `EpiError`.
///
/// Genuine errors are fail-fast: a probabilistic event that does not trigger
/// is normal operation, never an error. Nothing here is retried or silently
/// corrected, since silent correction would corrupt reproducibility.
#[derive(Debug)]
pub enum EpiError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    /// Malformed or out-of-range parameters, detected eagerly at
    /// initialization, never mid-run.
    Config(String),
    /// A configured probability distribution yielded an invalid draw,
    /// e.g. a negative duration. Aborts the run.
    Sampling(String),
    /// Internal data-model corruption, e.g. compartment counts that no
    /// longer partition the population. A fatal defect, not recoverable.
    InvariantViolation(String),
}

impl From<io::Error> for EpiError {
    fn from(error: io::Error) -> Self {
        EpiError::IoError(error)
    }
}

impl From<serde_json::Error> for EpiError {
    fn from(error: serde_json::Error) -> Self {
        EpiError::JsonError(error)
    }
}

impl From<csv::Error> for EpiError {
    fn from(error: csv::Error) -> Self {
        EpiError::CsvError(error)
    }
}

impl std::error::Error for EpiError {}

impl Display for EpiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EpiError::IoError(error) => write!(f, "IO error: {error}"),
            EpiError::JsonError(error) => write!(f, "JSON error: {error}"),
            EpiError::CsvError(error) => write!(f, "CSV error: {error}"),
            EpiError::Config(message) => write!(f, "configuration error: {message}"),
            EpiError::Sampling(message) => write!(f, "sampling error: {message}"),
            EpiError::InvariantViolation(message) => {
                write!(f, "state invariant violation: {message}")
            }
        }
    }
}
