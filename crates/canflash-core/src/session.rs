//! Upload session - orchestrates mute, boot handshake, transfer and unmute.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::boot::{BootNegotiator, BootOutcome};
use crate::cancel::CancelToken;
use crate::context::FlashContext;
use crate::error::{ConfigError, FlashError};
use crate::events::{FlashEvent, FlashObserver, LogLevel, TracingObserver};
use crate::firmware::FirmwareImage;
use crate::muter;
use crate::progress::ProgressHandle;
use crate::protocol::NodeId;
use crate::protocol::constants::MIN_BOOT_TIMEOUT_MS;
use crate::state::SessionState;
use crate::transfer::{FirmwareTransferer, TransferResult};
use crate::transport::{CanTransport, Clock, SystemClock};

/// Configuration for an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Node to flash.
    pub target: NodeId,
    /// Wait per boot attempt, in milliseconds.
    pub boot_timeout_ms: u64,
    pub max_boot_attempts: u32,
    /// Restore bus traffic once the transfer ends.
    pub unmute_after_upload: bool,
    /// Give up on a chunk after this many polls. Unbounded when absent.
    pub max_chunk_polls: Option<u64>,
    /// CAN interface used by the front ends.
    pub interface: Option<String>,
    /// Firmware file used by the front ends.
    pub firmware_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target: NodeId::Top,
            boot_timeout_ms: 10_000,
            max_boot_attempts: 1,
            unmute_after_upload: false,
            max_chunk_polls: None,
            interface: None,
            firmware_path: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve a node name (`TOP`, `BOTTOM`/`BOT`, `SENSE`).
    pub fn parse_target(name: &str) -> Result<NodeId, ConfigError> {
        name.parse()
            .map_err(|_| ConfigError::UnknownNode(name.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boot_timeout_ms < MIN_BOOT_TIMEOUT_MS {
            return Err(ConfigError::BootTimeoutTooShort(self.boot_timeout_ms));
        }
        if self.max_boot_attempts == 0 {
            return Err(ConfigError::NoBootAttempts);
        }
        if self.max_chunk_polls == Some(0) {
            return Err(ConfigError::ZeroPollCeiling);
        }
        Ok(())
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms)
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum UploadOutcome {
    /// Image delivered and finalized.
    Flashed(TransferResult),
    /// The target never confirmed bootloader mode.
    BootFailed { attempts: u32 },
    /// A phase ended with an error.
    Aborted {
        phase: SessionState,
        error: FlashError,
    },
}

/// Final record of a session.
#[derive(Debug)]
pub struct SessionReport {
    pub outcome: UploadOutcome,
    pub state: SessionState,
    /// Peers are still silenced.
    pub bus_muted: bool,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, UploadOutcome::Flashed(_))
    }

    pub fn into_result(self) -> Result<TransferResult, FlashError> {
        match self.outcome {
            UploadOutcome::Flashed(result) => Ok(result),
            UploadOutcome::BootFailed { attempts } => Err(FlashError::BootFailed { attempts }),
            UploadOutcome::Aborted { error, .. } => Err(error),
        }
    }
}

/// Upload session over a borrowed bus.
pub struct UploadSession<'a, T: CanTransport + ?Sized, O: FlashObserver + ?Sized = TracingObserver>
{
    transport: &'a T,
    image: FirmwareImage,
    config: SessionConfig,
    observer: Arc<O>,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    progress: ProgressHandle,
    state: SessionState,
    bus_muted: bool,
}

impl<'a, T: CanTransport + ?Sized> UploadSession<'a, T, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(
        transport: &'a T,
        image: FirmwareImage,
        config: SessionConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_observer(transport, image, config, Arc::new(TracingObserver))
    }
}

impl<'a, T: CanTransport + ?Sized, O: FlashObserver + ?Sized> UploadSession<'a, T, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(
        transport: &'a T,
        image: FirmwareImage,
        config: SessionConfig,
        observer: Arc<O>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transport,
            image,
            config,
            observer,
            clock: Arc::new(SystemClock::new()),
            cancel: CancelToken::new(),
            progress: ProgressHandle::new(),
            state: SessionState::Idle,
            bus_muted: false,
        })
    }

    /// Replace the wall clock, e.g. with a `SimClock` in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report progress through a handle the caller already shares.
    pub fn with_progress_handle(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    /// Transfer progress in percent, readable from any thread.
    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bus_muted(&self) -> bool {
        self.bus_muted
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn image(&self) -> &FirmwareImage {
        &self.image
    }

    fn set_state(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Unexpected state transition");
        }
        let from = self.state;
        self.state = next;
        self.observer
            .on_event(&FlashEvent::StateChanged { from, to: next });
    }

    /// Run the complete upload.
    ///
    /// Never returns early on a protocol failure; the report carries the
    /// outcome together with the final state and bus condition.
    #[instrument(skip(self), fields(node = %self.config.target, bytes = self.image.len()))]
    pub fn run(mut self) -> SessionReport {
        let clock = Arc::clone(&self.clock);
        let observer = Arc::clone(&self.observer);
        let cancel = self.cancel.clone();
        let ctx = FlashContext::new(self.transport, clock.as_ref(), observer.as_ref(), &cancel);

        muter::mute(&ctx);
        self.bus_muted = true;
        self.set_state(SessionState::Muted);

        self.set_state(SessionState::BootNegotiating);
        let negotiator = BootNegotiator::new(
            self.config.target,
            self.config.boot_timeout(),
            self.config.max_boot_attempts,
        );
        let attempts = match negotiator.negotiate(&ctx) {
            Ok(BootOutcome::Entered { attempt }) => attempt,
            Ok(BootOutcome::Failed { attempts }) => {
                // Peers stay silenced; the operator decides when to restore them
                error!(attempts, "Boot mode not entered, bus left muted");
                return self.finish(UploadOutcome::BootFailed { attempts });
            }
            Err(error) => {
                return self.finish(UploadOutcome::Aborted {
                    phase: SessionState::BootNegotiating,
                    error,
                });
            }
        };
        info!(attempts, "Starting transfer");

        self.set_state(SessionState::Transferring);
        let transferer = FirmwareTransferer::new(self.progress.clone())
            .with_max_chunk_polls(self.config.max_chunk_polls);
        let result = transferer.transfer(&ctx, self.image.as_bytes(), true);

        if self.config.unmute_after_upload {
            muter::unmute(&ctx);
            self.bus_muted = false;
        }

        match result {
            Ok(result) => self.finish(UploadOutcome::Flashed(result)),
            Err(error) => self.finish(UploadOutcome::Aborted {
                phase: SessionState::Transferring,
                error,
            }),
        }
    }

    fn finish(mut self, outcome: UploadOutcome) -> SessionReport {
        match &outcome {
            UploadOutcome::Flashed(result) => {
                info!(
                    bytes = result.bytes_sent,
                    packets_lost = result.packets_lost,
                    "Upload complete"
                );
                self.set_state(SessionState::Done);
            }
            UploadOutcome::BootFailed { attempts } => {
                self.observer.on_event(&FlashEvent::Error {
                    message: format!("Target did not enter bootloader mode after {} attempt(s)", attempts),
                });
                self.set_state(SessionState::Failed);
            }
            UploadOutcome::Aborted { phase, error } => {
                error!(phase = %phase, error = %error, "Upload aborted");
                self.observer.on_event(&FlashEvent::Error {
                    message: error.to_string(),
                });
                self.set_state(SessionState::Failed);
            }
        }

        if self.bus_muted {
            self.observer.on_event(&FlashEvent::Log {
                level: LogLevel::Warn,
                message: "CAN bus is still muted".to_string(),
            });
        }

        SessionReport {
            outcome,
            state: self.state,
            bus_muted: self.bus_muted,
        }
    }
}

/// Send the unmute sequence on its own, for a bus a failed session left
/// muted. Returns the number of frames the transport accepted.
pub fn restore_bus<T, O>(transport: &T, observer: &O) -> usize
where
    T: CanTransport + ?Sized,
    O: FlashObserver + ?Sized,
{
    let clock = SystemClock::new();
    let cancel = CancelToken::new();
    let ctx = FlashContext::new(transport, &clock, observer, &cancel);
    muter::unmute(&ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;
    use crate::transport::MockTransport;

    fn image() -> FirmwareImage {
        FirmwareImage::from_bytes(vec![1, 2, 3, 4]).unwrap()
    }

    #[test]
    fn test_boot_timeout_bounds() {
        let mock = MockTransport::new();
        let config = SessionConfig {
            boot_timeout_ms: 999,
            ..SessionConfig::default()
        };
        assert!(matches!(
            UploadSession::new(&mock, image(), config),
            Err(ConfigError::BootTimeoutTooShort(999))
        ));

        let config = SessionConfig {
            boot_timeout_ms: 1000,
            ..SessionConfig::default()
        };
        assert!(UploadSession::new(&mock, image(), config).is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = SessionConfig {
            max_boot_attempts: 0,
            ..SessionConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoBootAttempts));
    }

    #[test]
    fn test_zero_poll_ceiling_rejected() {
        let config = SessionConfig {
            max_chunk_polls: Some(0),
            ..SessionConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPollCeiling));
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(SessionConfig::parse_target("bot"), Ok(NodeId::Bottom));
        assert_eq!(SessionConfig::parse_target("Sense"), Ok(NodeId::Sense));
        assert_eq!(
            SessionConfig::parse_target("MIDDLE"),
            Err(ConfigError::UnknownNode("MIDDLE".to_string()))
        );
    }

    #[test]
    fn test_config_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canflash.toml");
        let config = SessionConfig {
            target: NodeId::Sense,
            boot_timeout_ms: 2500,
            max_boot_attempts: 4,
            unmute_after_upload: true,
            max_chunk_polls: Some(5000),
            interface: Some("can0".to_string()),
            firmware_path: None,
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(SessionConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SessionConfig = toml::from_str("target = \"BOT\"\n").unwrap();
        assert_eq!(config.target, NodeId::Bottom);
        assert_eq!(config.boot_timeout_ms, 10_000);
        assert_eq!(config.max_boot_attempts, 1);
        assert!(!config.unmute_after_upload);
        assert_eq!(config.max_chunk_polls, None);
    }

    #[test]
    fn test_state_events_on_boot_failure() {
        let mock = MockTransport::new();
        let observer = Arc::new(RecordingObserver::new());
        let config = SessionConfig {
            boot_timeout_ms: 1000,
            unmute_after_upload: true,
            ..SessionConfig::default()
        };
        let session = UploadSession::with_observer(&mock, image(), config, Arc::clone(&observer))
            .unwrap()
            .with_clock(Arc::new(mock.clock()));

        let report = session.run();
        assert_eq!(report.state, SessionState::Failed);
        assert!(report.bus_muted);
        assert!(matches!(report.outcome, UploadOutcome::BootFailed { attempts: 1 }));

        let states: Vec<SessionState> = observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                FlashEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::Muted,
                SessionState::BootNegotiating,
                SessionState::Failed
            ]
        );
    }
}
