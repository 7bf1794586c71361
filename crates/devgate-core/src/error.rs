//! Error types for devgate-core.
//!
//! This module defines the errors a device session can surface, plus the
//! [`BackendError`] type that protocol backends return.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::NotConnected`] | Connect, then retry | The session is not linked |
//! | [`Error::UnsupportedComponent`] | Do not retry | Component is not in the catalog |
//! | [`Error::UnsupportedCommand`] | Do not retry | Command is not offered by the device type |
//! | [`Error::UnsupportedOperation`] | Do not retry | Device type has no such capability |
//! | [`Error::UnsupportedProtocol`] | Do not retry | Wrong backend for the device type |
//! | [`Error::Backend`] | Retry if [`BackendError::is_transient`] | Remote call failed or timed out |
//! | [`Error::Decode`] | Do not retry | Payload does not match the decoder |
//! | [`Error::InvalidPayload`] | Do not retry | Caller supplied a bad payload |
//! | [`Error::InvalidConfig`] / [`Error::Config`] | Do not retry | Fix configuration and restart |
//!
//! Caller errors are reported synchronously and are never retried by the
//! session. Only the backend link step of `connect` runs under
//! [`crate::with_retry`].

use std::time::Duration;

use thiserror::Error;

use devgate_types::{DecodeError, ProtocolKind};

use crate::config::ConfigError;

/// Errors returned by a [`ProtocolBackend`](crate::backend::ProtocolBackend).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The IPC transport failed (bus disconnected, marshaling error).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote call did not complete in time.
    #[error("timed out after {duration:?}")]
    Timeout {
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// The backend executed the call and returned an error.
    #[error("remote error {name}: {message}")]
    Remote {
        /// Remote error name.
        name: String,
        /// Remote error message.
        message: String,
    },

    /// No backend is reachable for this protocol.
    #[error("protocol backend unavailable")]
    Unavailable,
}

impl BackendError {
    /// Create a remote error.
    pub fn remote(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Transport failures, timeouts and an unreachable backend are transient;
    /// errors reported by the backend itself are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout { .. } | Self::Unavailable
        )
    }
}

/// Errors that can occur when operating a device session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Operation attempted while the session is not connected.
    #[error("Device {device} is not connected")]
    NotConnected {
        /// Logical id of the device.
        device: String,
    },

    /// The component is not part of the device type's catalog.
    #[error("Component '{component}' is not supported by device type {device_type}")]
    UnsupportedComponent {
        /// Device type name.
        device_type: String,
        /// Requested component.
        component: String,
    },

    /// The command is not offered by the device type.
    #[error("Command '{command}' is not supported by device type {device_type}")]
    UnsupportedCommand {
        /// Device type name.
        device_type: String,
        /// Requested command.
        command: String,
    },

    /// The device type does not implement the operation at all.
    #[error("Operation '{operation}' is not supported by device type {device_type}")]
    UnsupportedOperation {
        /// Device type name.
        device_type: String,
        /// Operation name.
        operation: String,
    },

    /// The backend or discovery metadata speaks a different protocol than the device type.
    #[error("Unsupported protocol: device type requires {expected}, got {actual}")]
    UnsupportedProtocol {
        /// Protocol the device type requires.
        expected: ProtocolKind,
        /// Protocol that was supplied.
        actual: ProtocolKind,
    },

    /// A remote call to the protocol backend failed.
    #[error("Backend call '{operation}' failed: {source}")]
    Backend {
        /// The backend operation that failed.
        operation: String,
        /// The backend failure.
        #[source]
        source: BackendError,
    },

    /// A raw payload could not be decoded.
    #[error("Failed to decode component '{component}': {source}")]
    Decode {
        /// Component whose decoder failed.
        component: String,
        /// The decode failure.
        #[source]
        source: DecodeError,
    },

    /// The caller supplied an invalid payload.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Gateway configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Create a not connected error.
    pub fn not_connected(device: impl Into<String>) -> Self {
        Self::NotConnected {
            device: device.into(),
        }
    }

    /// Create an unsupported component error.
    pub fn unsupported_component(
        device_type: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self::UnsupportedComponent {
            device_type: device_type.into(),
            component: component.into(),
        }
    }

    /// Create an unsupported command error.
    pub fn unsupported_command(device_type: impl Into<String>, command: impl Into<String>) -> Self {
        Self::UnsupportedCommand {
            device_type: device_type.into(),
            command: command.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported_operation(
        device_type: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::UnsupportedOperation {
            device_type: device_type.into(),
            operation: operation.into(),
        }
    }

    /// Create a backend failure with operation context.
    pub fn backend(operation: impl Into<String>, source: BackendError) -> Self {
        Self::Backend {
            operation: operation.into(),
            source,
        }
    }

    /// Create a decode failure for a component.
    pub fn decode(component: impl Into<String>, source: DecodeError) -> Self {
        Self::Decode {
            component: component.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend { source, .. } if source.is_transient())
    }

    /// Whether the error was caused by the caller rather than the backend.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Self::Backend { .. } | Self::Decode { .. })
    }
}

/// Result type alias using devgate-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
