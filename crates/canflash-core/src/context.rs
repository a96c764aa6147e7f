//! Shared resources of a running protocol phase.

use std::time::Duration;

use tracing::{trace, warn};

use crate::cancel::CancelToken;
use crate::error::FlashError;
use crate::events::{FlashEvent, FlashObserver, LogLevel, PacketDirection};
use crate::protocol::CanFrame;
use crate::protocol::constants::INTER_FRAME_SPACING;
use crate::transport::{CanTransport, Clock, TransportError};

/// Everything a protocol phase needs: the bus, a clock, an observer and a
/// cancellation flag.
pub struct FlashContext<'a, T: CanTransport + ?Sized, O: FlashObserver + ?Sized> {
    pub transport: &'a T,
    pub clock: &'a dyn Clock,
    pub observer: &'a O,
    pub cancel: &'a CancelToken,
}

impl<'a, T: CanTransport + ?Sized, O: FlashObserver + ?Sized> FlashContext<'a, T, O> {
    pub fn new(
        transport: &'a T,
        clock: &'a dyn Clock,
        observer: &'a O,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            transport,
            clock,
            observer,
            cancel,
        }
    }

    pub(crate) fn emit(&self, event: FlashEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(FlashEvent::Log {
            level,
            message: message.into(),
        });
    }

    /// Send one frame, then hold the inter-frame spacing.
    ///
    /// A failed send is logged and reported as `false`; callers rely on their
    /// own repeat/resend schedule instead of retrying here.
    pub(crate) fn send(&self, frame: &CanFrame) -> bool {
        let sent = match self.transport.send(frame) {
            Ok(()) => {
                self.emit(FlashEvent::Packet {
                    direction: PacketDirection::Tx,
                    frame: *frame,
                });
                true
            }
            Err(e) => {
                warn!(frame = %frame, error = %e, "CAN message NOT sent");
                self.log(LogLevel::Warn, format!("CAN message NOT sent: {}", e));
                false
            }
        };
        self.clock.sleep(INTER_FRAME_SPACING);
        sent
    }

    /// One receive with `timeout`, after checking for cancellation.
    ///
    /// A lost interface is fatal; any other receive error counts as an
    /// empty poll and still costs `timeout`, so the poll cadence holds.
    pub(crate) fn poll(&self, timeout: Duration) -> Result<Option<CanFrame>, FlashError> {
        if self.cancel.is_cancelled() {
            return Err(FlashError::Cancelled);
        }
        match self.transport.recv(timeout) {
            Ok(Some(frame)) => {
                trace!(frame = %frame, "Received");
                self.emit(FlashEvent::Packet {
                    direction: PacketDirection::Rx,
                    frame,
                });
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(TransportError::Disconnected) => Err(TransportError::Disconnected.into()),
            Err(e) => {
                warn!(error = %e, "Transient receive error, polling again");
                self.clock.sleep(timeout);
                Ok(None)
            }
        }
    }

    pub(crate) fn sleep(&self, duration: Duration) {
        self.clock.sleep(duration);
    }
}
