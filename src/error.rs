//! Crate-wide error taxonomy.
//!
//! Four kinds of failure flow out of the engine:
//! - invalid input (bad indices, malformed element text, impossible
//!   eccentricity) — caller recoverable,
//! - per-object numerical failure (non-convergent Kepler, e ≥ 1) —
//!   reported per object, the batch continues,
//! - resource failure (allocation, file open) — terminal for the
//!   operation, never the process,
//! - external failure (network fetch, parse of fetched data) — tagged
//!   with the source name.
//!
//! The numerical core never panics on valid input; every failure is a
//! tagged `Err` value.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for catalog, propagation, screening and history
/// operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("object {index}: {message}")]
    Numerical { index: usize, message: String },

    #[error("resource failure: {0}")]
    Resource(String),

    #[error("external failure from '{source_name}' after {attempts} attempt(s): {message}")]
    External {
        source_name: String,
        attempts: u32,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tle(#[from] crate::tle::TleError),
}

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    pub fn numerical(index: usize, message: impl Into<String>) -> Self {
        Error::Numerical {
            index,
            message: message.into(),
        }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Error::Resource(message.into())
    }

    pub fn external(source_name: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Error::External {
            source_name: source_name.into(),
            attempts,
            message: message.into(),
        }
    }

    /// True for failures the caller can work around (skip the object or
    /// retry the source), false for operation-terminal ones.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::Numerical { .. } | Error::External { .. } | Error::Tle(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numerical_is_recoverable() {
        let err = Error::numerical(17, "Kepler iteration did not converge");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("object 17"));
    }

    #[test]
    fn test_external_carries_source() {
        let err = Error::external("CelesTrak Active", 3, "empty response body");
        assert!(err.is_recoverable());
        let msg = err.to_string();
        assert!(msg.contains("CelesTrak Active"));
        assert!(msg.contains("3 attempt"));
    }

    #[test]
    fn test_resource_is_terminal() {
        let err = Error::resource("column allocation failed");
        assert!(!err.is_recoverable());
    }
}
