//! Errors
//!
//! Custom error types used throughout the `labelfree` crate.
use thiserror::Error;

/// Errors that can occur while estimating performance or calculating drift.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MonitorError {
    /// A parameter or argument was rejected. The message is part of the public contract.
    #[error("{0}")]
    InvalidArguments(String),
    /// A column required by the configuration is not present in the data.
    #[error("missing required column '{0}'.")]
    MissingColumn(String),
    /// Operation requires a fitted instance.
    #[error("{0} has not been fitted yet. Call 'fit' with reference data first.")]
    NotFitted(String),
    /// No usable rows were left in the data.
    #[error("no usable rows in {0}.")]
    EmptyData(String),
    /// Unable to write configuration or results.
    #[error("Unable to write to file: {0}")]
    UnableToWrite(String),
    /// Unable to read configuration.
    #[error("Unable to read from file: {0}")]
    UnableToRead(String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
}

impl MonitorError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MonitorError::InvalidArguments(msg.into())
    }
}
