// ── Core error types ──
//
// Every failure a caller can see from a device operation. Each variant
// names the operation it came from so that errors stay attributable when
// several calls are queued behind the global radio lock.

use std::time::Duration;

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::model::{BondState, DeviceId, Operation};

/// Coarse classification of [`BleError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any lock was taken. Retrying unchanged will fail again.
    Precondition,
    Timeout,
    AdapterOff,
    DeviceDisconnected,
    /// Reported by the bridge or the native stack.
    Platform,
}

/// Unified error type for device operations.
#[derive(Debug, Error)]
pub enum BleError {
    // ── Precondition errors ──────────────────────────────────────────
    #[error("{operation}: only supported on {required}")]
    Unsupported {
        operation: Operation,
        required: &'static str,
    },

    #[error("{operation}: invalid arguments: {reason}")]
    InvalidArgument { operation: Operation, reason: String },

    #[error("{operation}: device {device} is not connected")]
    NotConnected {
        operation: Operation,
        device: DeviceId,
    },

    // ── Wait outcomes ────────────────────────────────────────────────
    #[error("{operation}: timed out after {}ms", timeout.as_millis())]
    Timeout {
        operation: Operation,
        timeout: Duration,
    },

    #[error("{operation}: bluetooth adapter is off")]
    AdapterIsOff { operation: Operation },

    #[error("{operation}: device {device} disconnected before a response arrived")]
    DeviceIsDisconnected {
        operation: Operation,
        device: DeviceId,
    },

    // ── Recognized native sub-codes ──────────────────────────────────
    #[error("{operation}: connection attempt was canceled")]
    ConnectionCanceled { operation: Operation },

    #[error("{operation}: bond ended in unexpected state '{state}'")]
    BondFailed {
        operation: Operation,
        state: BondState,
    },

    // ── Native errors (opaque) ───────────────────────────────────────
    #[error("{operation}: native error {code}: {message}")]
    Platform {
        operation: Operation,
        code: i32,
        message: String,
    },

    #[error("{operation}: bridge error: {source}")]
    Bridge {
        operation: Operation,
        #[source]
        source: BridgeError,
    },

    #[error("{operation}: event stream closed")]
    EventStreamClosed { operation: Operation },
}

impl BleError {
    /// The operation that produced this error.
    pub fn operation(&self) -> Operation {
        match self {
            Self::Unsupported { operation, .. }
            | Self::InvalidArgument { operation, .. }
            | Self::NotConnected { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::AdapterIsOff { operation }
            | Self::DeviceIsDisconnected { operation, .. }
            | Self::ConnectionCanceled { operation }
            | Self::BondFailed { operation, .. }
            | Self::Platform { operation, .. }
            | Self::Bridge { operation, .. }
            | Self::EventStreamClosed { operation } => *operation,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unsupported { .. } | Self::InvalidArgument { .. } | Self::NotConnected { .. } => {
                ErrorKind::Precondition
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::AdapterIsOff { .. } => ErrorKind::AdapterOff,
            Self::DeviceIsDisconnected { .. } => ErrorKind::DeviceDisconnected,
            Self::ConnectionCanceled { .. }
            | Self::BondFailed { .. }
            | Self::Platform { .. }
            | Self::Bridge { .. }
            | Self::EventStreamClosed { .. } => ErrorKind::Platform,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn android_only(operation: Operation) -> Self {
        Self::Unsupported {
            operation,
            required: "android",
        }
    }
}
