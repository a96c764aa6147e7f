//! Event system for UI decoupling.
//!
//! Allows CLI/TUI front ends to subscribe to protocol events without
//! tight coupling to the core logic.

use std::fmt;

use crate::protocol::{CanFrame, NodeId};
use crate::state::SessionState;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by an upload session.
#[derive(Debug, Clone)]
pub enum FlashEvent {
    /// Session state changed.
    StateChanged { from: SessionState, to: SessionState },
    /// A boot request was sent.
    BootAttempt {
        node: NodeId,
        attempt: u32,
        max_attempts: u32,
    },
    /// Target acknowledged boot mode.
    BootModeEntered { node: NodeId, attempt: u32 },
    /// Chunk acknowledged.
    Progress {
        bytes_processed: usize,
        total_bytes: usize,
        percent: f64,
    },
    /// A response did not match the frame just sent.
    PacketLost { counter: u32, total_lost: u64 },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Frame sent/received.
    Packet {
        direction: PacketDirection,
        frame: CanFrame,
    },
    /// Error occurred.
    Error { message: String },
    /// Transfer finalized.
    Complete { bytes_sent: usize, packets_lost: u64 },
}

/// Frame direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Bus
    Rx, // Bus -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving flash events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait FlashObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &FlashEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl FlashObserver for NullObserver {
    fn on_event(&self, _event: &FlashEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl FlashObserver for TracingObserver {
    fn on_event(&self, event: &FlashEvent) {
        match event {
            FlashEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "State changed");
            }
            FlashEvent::BootAttempt {
                node,
                attempt,
                max_attempts,
            } => {
                tracing::info!(node = %node, attempt, max_attempts, "Requesting boot mode");
            }
            FlashEvent::BootModeEntered { node, attempt } => {
                tracing::info!(node = %node, attempt, "Node in bootloader mode");
            }
            FlashEvent::Progress {
                bytes_processed,
                total_bytes,
                percent,
            } => {
                tracing::debug!(
                    bytes = bytes_processed,
                    total = total_bytes,
                    progress = %format!("{:.1}%", percent),
                    "Progress"
                );
            }
            FlashEvent::PacketLost {
                counter,
                total_lost,
            } => {
                tracing::warn!(counter, total_lost, "Packet lost, sending again");
            }
            FlashEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            FlashEvent::Packet { direction, frame } => {
                tracing::trace!(dir = %direction, frame = %frame, "CAN frame");
            }
            FlashEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
            FlashEvent::Complete {
                bytes_sent,
                packets_lost,
            } => {
                tracing::info!(bytes_sent, packets_lost, "Data sent");
            }
        }
    }
}

/// Observer that records every event, for tests and post-mortem dumps.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<FlashEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<FlashEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl FlashObserver for RecordingObserver {
    fn on_event(&self, event: &FlashEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
