//! CAN transport layer abstraction.
//!
//! Defines the `CanTransport` trait for frame-level bus access,
//! allowing different implementations (SocketCAN, mock, etc.).

use std::time::Duration;

use thiserror::Error;

use crate::protocol::CanFrame;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Failed to open interface {interface}: {message}")]
    OpenFailed { interface: String, message: String },

    #[error("Frame rejected by backend: {0}")]
    InvalidFrame(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Interface down")]
    Disconnected,

    #[error("Transport not supported on this platform")]
    Unsupported,
}

/// Abstract CAN bus interface.
///
/// This trait enables:
/// - Production implementation over SocketCAN
/// - Mock implementation for unit testing
/// - Future alternative backends (PCAN, slcan, ...)
pub trait CanTransport: Send + Sync {
    /// Queue one frame for transmission.
    fn send(&self, frame: &CanFrame) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next frame. `Ok(None)` means the timeout
    /// elapsed with nothing received.
    fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, TransportError>;

    /// Human readable name of the underlying interface.
    fn name(&self) -> &str {
        "can"
    }
}
