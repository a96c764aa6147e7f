//! canflash-core: firmware upload over a CAN bus.
//!
//! This crate implements the bootloader protocol used to reflash the Top,
//! Bottom and Sense controllers sharing one CAN bus: silence the peers,
//! talk the target into bootloader mode, stream the image in acknowledged
//! 4-byte chunks and finalize.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Arbitration ids, command words, frame codec
//! - **Transport**: CAN bus abstraction (SocketCAN, mock) and clocks
//! - **Muter / Boot / Transfer**: The three protocol phases
//! - **State**: Session state machine
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//! - **Firmware**: Intel-HEX image loading
//!
//! # Example
//!
//! ```no_run
//! use canflash_core::{FirmwareImage, SessionConfig, UploadSession, transport};
//!
//! let bus = transport::open("can0").expect("no CAN interface");
//! let image = FirmwareImage::load("app.hex").expect("bad firmware");
//! let config = SessionConfig {
//!     unmute_after_upload: true,
//!     ..Default::default()
//! };
//!
//! let session = UploadSession::new(bus.as_ref(), image, config).expect("bad config");
//! let report = session.run();
//! assert!(report.is_success());
//! ```

pub mod boot;
pub mod cancel;
pub mod context;
pub mod error;
pub mod events;
pub mod firmware;
pub mod muter;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use boot::{BootNegotiator, BootOutcome, enter_boot_mode};
pub use cancel::CancelToken;
pub use context::FlashContext;
pub use error::{ConfigError, FlashError};
pub use events::{FlashEvent, FlashObserver, LogLevel, NullObserver, TracingObserver};
pub use firmware::{FirmwareError, FirmwareImage};
pub use progress::ProgressHandle;
pub use protocol::{CanFrame, NodeId};
pub use session::{SessionConfig, SessionReport, UploadOutcome, UploadSession, restore_bus};
pub use state::SessionState;
pub use transfer::{FirmwareTransferer, TransferResult};
pub use transport::{CanTransport, MockTransport, SimClock, SystemClock, TransportError};
