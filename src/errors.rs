//! All errors that can occur in the allefit library.

use std::fmt;

pub type Result<T> = std::result::Result<T, AllefitError>;

/// Error taxonomy for an inference run.
///
/// Configuration and data errors are reported at the outermost boundary and
/// terminate the run; invariant violations must never happen under correct
/// sampling and abort rather than truncate the posterior.
#[derive(Clone, Debug, PartialEq)]
pub enum AllefitError {
    /// Missing or inconsistent parameters that cannot be auto-derived.
    ConfigError(String),
    /// Malformed or unreadable observed-data or parameter files.
    DataError(String),
    /// Prior-index coverage incomplete after aggregation, or similar.
    InvariantViolation(String),
    /// Statistics requested on an empty accepted set.
    InsufficientData(String),
    /// Output file could not be written.
    WriteError(String),
}

impl fmt::Display for AllefitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllefitError::ConfigError(message) => {
                write!(f, "ConfigError: {}", message)
            }
            AllefitError::DataError(message) => {
                write!(f, "DataError: {}", message)
            }
            AllefitError::InvariantViolation(message) => {
                write!(f, "InvariantViolation: {}", message)
            }
            AllefitError::InsufficientData(message) => {
                write!(f, "InsufficientData: {}", message)
            }
            AllefitError::WriteError(message) => {
                write!(f, "WriteError: {}", message)
            }
        }
    }
}

impl std::error::Error for AllefitError {}
