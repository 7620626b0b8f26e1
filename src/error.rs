//! Error types for the session core
//! Failures that end a connection are carried by the controller state so the
//! reason survives the transition; everything here is `Clone` for that reason.

use serde::Serialize;
use thiserror::Error;

use crate::core::bluetooth::types::PeripheralId;

/// Which part of the profile discovery failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProfileScope {
    /// Listing the services of the peripheral
    Services,
    /// Listing the characteristics of one service
    Characteristics(uuid::Uuid),
}

impl std::fmt::Display for ProfileScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Services => write!(f, "services"),
            Self::Characteristics(service) => write!(f, "characteristics of {}", service),
        }
    }
}

/// Why the controller refused a command
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum RejectCause {
    #[error("a connection attempt is already in flight")]
    ConnectInFlight,

    #[error("a peripheral is already connected")]
    AlreadyConnected,

    #[error("unknown peripheral: {0}")]
    UnknownPeripheral(PeripheralId),

    #[error("no peripheral is connected")]
    NotConnected,

    #[error("bluetooth radio is unavailable")]
    RadioUnavailable,

    #[error("not allowed while {0}")]
    InvalidState(&'static str),
}

/// Error type for scan, connection and profile operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("peripheral disconnected unexpectedly: {}", .0.as_deref().unwrap_or("no reason given"))]
    DisconnectedUnexpectedly(Option<String>),

    #[error("profile discovery failed for {scope}: {reason}")]
    ProfileDiscoveryFailed { scope: ProfileScope, reason: String },

    #[error("operation rejected: {0}")]
    OperationRejected(#[from] RejectCause),

    #[error("scan failed: {0}")]
    ScanFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::ConnectFailed("timeout".to_string());
        assert_eq!(err.to_string(), "connection failed: timeout");

        let err = SessionError::DisconnectedUnexpectedly(None);
        assert_eq!(
            err.to_string(),
            "peripheral disconnected unexpectedly: no reason given"
        );

        let err = SessionError::ProfileDiscoveryFailed {
            scope: ProfileScope::Services,
            reason: "gatt error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "profile discovery failed for services: gatt error"
        );

        let err: SessionError = RejectCause::ConnectInFlight.into();
        assert_eq!(
            err.to_string(),
            "operation rejected: a connection attempt is already in flight"
        );

        let err: SessionError = RejectCause::InvalidState("connecting").into();
        assert_eq!(err.to_string(), "operation rejected: not allowed while connecting");
    }
}
