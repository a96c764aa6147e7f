//! Error types for the flashing engine.

use thiserror::Error;

use crate::transport::TransportError;

/// Invalid session configuration. Raised before any frame is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown target node '{0}' (expected TOP, BOTTOM or SENSE)")]
    UnknownNode(String),

    #[error("Boot timeout must be at least 1000ms, got {0}ms")]
    BootTimeoutTooShort(u64),

    #[error("Boot attempts must be at least 1")]
    NoBootAttempts,

    #[error("Chunk poll ceiling must be at least 1 when set")]
    ZeroPollCeiling,
}

/// Failure of a protocol phase.
#[derive(Error, Debug)]
pub enum FlashError {
    #[error("Target is not in bootloader mode")]
    NotInBootMode,

    #[error("Target did not enter bootloader mode after {attempts} attempt(s)")]
    BootFailed { attempts: u32 },

    #[error("CAN bus busy: foreign frame 0x{id:03X} seen during idle check")]
    BusBusy { id: u32 },

    #[error("Chunk {counter} not acknowledged after {polls} polls")]
    Stalled { counter: u32, polls: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
