//! Error types for northbound statistics operations.
//!
//! Every failure is detected where it happens, logged there with the
//! operation and switch id, and returned to the caller. Nothing in this
//! crate retries or terminates the process.

use nbapi_types::{DatapathId, RateDirection};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for northbound statistics operations.
pub type NbResult<T> = Result<T, NbStatsError>;

/// Errors returned by the statistics and rate-limit operations.
#[derive(Debug, Error)]
pub enum NbStatsError {
    /// No switch-state service is attached.
    #[error("Switch-state service unavailable")]
    ServiceUnavailable,

    /// The switch is not known to the controller.
    #[error("No such switch: {dpid}")]
    SwitchNotFound {
        /// The queried switch.
        dpid: DatapathId,
    },

    /// A response failed type, length or command-code validation.
    #[error("Protocol error in {operation}: {reason}")]
    ProtocolError {
        /// The operation that received the bad frame.
        operation: &'static str,
        /// What did not match.
        reason: String,
    },

    /// A buffer could not be allocated.
    #[error("Allocation failed for {what}")]
    AllocationFailure {
        /// The buffer being allocated.
        what: &'static str,
    },

    /// The service rejected a rate-limit get or set.
    #[error("Rate-limit operation failed for switch {dpid} ({direction}): {reason}")]
    RateLimitOperationFailed {
        dpid: DatapathId,
        direction: RateDirection,
        reason: String,
    },

    /// No response arrived within the configured bound.
    #[error("Timed out after {timeout:?} waiting for {operation} response")]
    ResponseTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The service reported that no response is coming.
    #[error("No response from service for {operation}")]
    NoResponse { operation: &'static str },

    /// The service answered with a failure frame.
    #[error("Service rejected {operation} (code {code:?})")]
    ServiceRejected {
        operation: &'static str,
        code: Option<u32>,
    },

    /// Socket I/O with the service failed.
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NbStatsError {
    /// Creates a protocol error.
    pub fn protocol(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::ProtocolError {
            operation,
            reason: reason.into(),
        }
    }

    /// Creates a rate-limit failure.
    pub fn rate_limit_failed(
        dpid: DatapathId,
        direction: RateDirection,
        reason: impl Into<String>,
    ) -> Self {
        Self::RateLimitOperationFailed {
            dpid,
            direction,
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed if the caller reissues the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NbStatsError::ServiceUnavailable
                | NbStatsError::ResponseTimeout { .. }
                | NbStatsError::NoResponse { .. }
                | NbStatsError::Transport(_)
        )
    }
}
