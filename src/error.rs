//! Error types for the MELSEC client.

use std::io;
use thiserror::Error;

/// Result type alias for MELSEC operations.
pub type Result<T> = std::result::Result<T, McError>;

/// Errors that can occur while talking to a controller.
#[derive(Debug, Error)]
pub enum McError {
    /// The device address is malformed or names an unsupported device class.
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The address string as given by the caller.
        address: String,
        /// Description of the addressing error.
        reason: String,
    },

    /// Invalid parameter provided.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// I/O failed and the single reconnect attempt did not recover it.
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// Description of the underlying failure.
        reason: String,
    },

    /// The controller answered with a non-zero status code.
    #[error("PLC error code: 0x{code}")]
    DeviceError {
        /// Status field of the response, two hex characters.
        code: String,
    },

    /// The reply was truncated or could not be decoded.
    #[error("Short response: {reason}")]
    ShortResponse {
        /// Description of what was wrong with the reply.
        reason: String,
    },

    /// No tag is registered under the given name or address.
    #[error("Tag '{name}' not found")]
    TagNotFound {
        /// Name or address that was looked up.
        name: String,
    },

    /// A poll loop is already running for this client.
    #[error("Polling is already running")]
    AlreadyPolling,

    /// Operating system error outside a controller exchange.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl McError {
    /// Creates a new `InvalidAddress` error.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_mc::McError;
    ///
    /// let err = McError::invalid_address("Q10", "unsupported device class 'Q'");
    /// ```
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `ConnectionLost` error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Creates a new `DeviceError` from the response status field.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_mc::McError;
    ///
    /// let err = McError::device_error("4A");
    /// assert_eq!(err.to_string(), "PLC error code: 0x4A");
    /// ```
    pub fn device_error(code: impl Into<String>) -> Self {
        Self::DeviceError { code: code.into() }
    }

    /// Creates a new `ShortResponse` error.
    pub fn short_response(reason: impl Into<String>) -> Self {
        Self::ShortResponse {
            reason: reason.into(),
        }
    }

    /// Returns whether the error is a transport-level fault worth retrying later.
    ///
    /// `ConnectionLost` and `ShortResponse` are transient. Addressing and
    /// device errors point at a logical problem and will fail the same way
    /// again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. } | Self::ShortResponse { .. })
    }
}
