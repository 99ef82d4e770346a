//! Calibration errors.
//!
//! A single error type is shared by the queueing solver, the observation model, the filter and the tuner.
//! Construction errors are fatal; everything raised inside a cycle is recoverable by skipping that cycle.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Dimension mismatch, non-positive noise, malformed bounds or queue parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The observation function is undefined at the requested state or environment.
    #[error("observation unavailable: {0}")]
    ObservationUnavailable(String),

    /// Innovation covariance not positive definite, or too badly conditioned to invert.
    #[error("singular innovation covariance: {0}")]
    SingularCovariance(String),

    /// Numerical divergence while solving the queueing chain.
    #[error("queueing chain unstable: {0}")]
    Unstable(String),
}

impl Error {
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration(message.into())
    }

    pub fn observation_unavailable(message: impl Into<String>) -> Self {
        Error::ObservationUnavailable(message.into())
    }

    /// True if the current cycle may be skipped and the prior estimate kept.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InvalidConfiguration(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
