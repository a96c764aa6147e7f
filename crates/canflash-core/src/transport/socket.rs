//! SocketCAN transport implementation (Linux).

use std::io;
use std::time::Duration;

use socketcan::{
    CanFrame as SocketFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId,
};
use tracing::{debug, info, instrument, trace, warn};

use super::traits::{CanTransport, TransportError};
use crate::protocol::CanFrame;

/// Raw SocketCAN socket bound to one interface.
///
/// The bit rate is a property of the interface (`ip link set can0 type can
/// bitrate 1000000`), not of the socket.
pub struct SocketCanTransport {
    socket: CanSocket,
    interface: String,
}

impl SocketCanTransport {
    /// Open a CAN interface by name, e.g. `can0`.
    #[instrument(level = "info")]
    pub fn open(interface: &str) -> Result<Self, TransportError> {
        let socket = CanSocket::open(interface).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TransportError::InterfaceNotFound(interface.to_string()),
            _ => TransportError::OpenFailed {
                interface: interface.to_string(),
                message: e.to_string(),
            },
        })?;

        info!(interface = %interface, "CAN interface opened");

        Ok(Self {
            socket,
            interface: interface.to_string(),
        })
    }

    fn to_socket_frame(frame: &CanFrame) -> Result<SocketFrame, TransportError> {
        let id: Id = if frame.is_extended() {
            ExtendedId::new(frame.id())
                .ok_or_else(|| TransportError::InvalidFrame(format!("{:?}", frame)))?
                .into()
        } else {
            StandardId::new(frame.id() as u16)
                .ok_or_else(|| TransportError::InvalidFrame(format!("{:?}", frame)))?
                .into()
        };
        SocketFrame::new(id, frame.data())
            .ok_or_else(|| TransportError::InvalidFrame(format!("{:?}", frame)))
    }

    fn from_socket_frame(frame: &SocketFrame) -> Option<CanFrame> {
        match frame {
            SocketFrame::Error(err) => {
                warn!(error = ?err, "CAN error frame");
                None
            }
            _ => match frame.id() {
                Id::Standard(id) => CanFrame::new(id.as_raw() as u32, frame.data()),
                Id::Extended(id) => CanFrame::new_extended(id.as_raw(), frame.data()),
            },
        }
    }
}

impl CanTransport for SocketCanTransport {
    #[instrument(skip(self, frame), fields(id = frame.id(), len = frame.len()))]
    fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        let raw = Self::to_socket_frame(frame)?;
        self.socket.write_frame(&raw).map_err(|e| match e.kind() {
            io::ErrorKind::NetworkDown => TransportError::Disconnected,
            _ => TransportError::SendFailed(e.to_string()),
        })?;
        trace!(frame = %frame, "Frame sent");
        Ok(())
    }

    fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        match self.socket.read_frame_timeout(timeout) {
            Ok(raw) => {
                let frame = Self::from_socket_frame(&raw);
                if let Some(f) = &frame {
                    trace!(frame = %f, "Frame received");
                }
                Ok(frame)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::NetworkDown => {
                debug!(interface = %self.interface, "Interface down");
                Err(TransportError::Disconnected)
            }
            Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        &self.interface
    }
}
