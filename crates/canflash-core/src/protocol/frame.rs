//! CAN frame type and the bootloader frame codec.
//!
//! Everything here is pure: builders take constants, a counter and a
//! firmware slice and return a [`CanFrame`]. No I/O happens in this module.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use super::constants::*;
use super::node::NodeId;

/// A classic CAN data frame.
///
/// The bootloader protocol only uses 11-bit standard ids; extended frames
/// are representable so a backend can report foreign traffic faithfully.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: u32,
    extended: bool,
    data: [u8; MAX_PAYLOAD_LEN],
    len: u8,
}

impl CanFrame {
    /// Build a standard frame. Returns `None` if the id does not fit 11 bits
    /// or the payload is longer than 8 bytes.
    pub fn new(id: u32, payload: &[u8]) -> Option<Self> {
        if id > MAX_STANDARD_ID {
            return None;
        }
        Self::build(id, false, payload)
    }

    /// Build an extended (29-bit) frame.
    pub fn new_extended(id: u32, payload: &[u8]) -> Option<Self> {
        if id > MAX_EXTENDED_ID {
            return None;
        }
        Self::build(id, true, payload)
    }

    fn build(id: u32, extended: bool, payload: &[u8]) -> Option<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return None;
        }
        let mut data = [0u8; MAX_PAYLOAD_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            id,
            extended,
            data,
            len: payload.len() as u8,
        })
    }

    /// Arbitration id.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// True for a standard frame carrying exactly `id`.
    pub fn has_id(&self, id: u32) -> bool {
        !self.extended && self.id == id
    }

    /// Payload bytes (0 to 8).
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Last payload byte, used by boot-mode responses to name the node.
    pub fn last_byte(&self) -> Option<u8> {
        self.data().last().copied()
    }

    /// Hex dump of the payload, e.g. `00 00 00 01 AA`.
    pub fn hex(&self) -> String {
        self.data()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "CanFrame(0x{:08X}x [{}] {})", self.id, self.len, self.hex())
        } else {
            write!(f, "CanFrame(0x{:03X} [{}] {})", self.id, self.len, self.hex())
        }
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "{:08X}#{}", self.id, self.hex())
        } else {
            write!(f, "{:03X}#{}", self.id, self.hex())
        }
    }
}

/// Two-part command words used by the mute / unmute sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `SS` + `00 00 FF 00 00 00`
    SilenceFf,
    /// `SS` + zeros
    SilenceZero,
    /// `PE` + zeros
    PeZero,
    /// `PE` + `00 00 01 00 00 00`
    PeOne,
    /// `FF 00` + zeros, addressed to the bootloader id
    BootloaderHold,
}

impl Command {
    /// The 8 payload bytes of this command.
    pub fn bytes(self) -> [u8; 8] {
        let (prefix, body) = match self {
            Command::SilenceFf => (PREFIX_SS, BODY_FF),
            Command::SilenceZero => (PREFIX_SS, BODY_00),
            Command::PeZero => (PREFIX_PE, BODY_00),
            Command::PeOne => (PREFIX_PE, BODY_01),
            Command::BootloaderHold => (PREFIX_FF00, BODY_00),
        };
        let mut out = [0u8; 8];
        out[..2].copy_from_slice(&prefix);
        out[2..].copy_from_slice(&body);
        out
    }
}

fn fixed(id: u32, payload: [u8; MAX_PAYLOAD_LEN]) -> CanFrame {
    CanFrame {
        id,
        extended: false,
        data: payload,
        len: MAX_PAYLOAD_LEN as u8,
    }
}

/// A mute / unmute command frame addressed to `id`.
pub fn command_frame(id: u32, command: Command) -> CanFrame {
    fixed(id, command.bytes())
}

/// Boot request for `node`.
pub fn boot_request(node: NodeId) -> CanFrame {
    fixed(node.arbitration_id(), BOOT_REQUEST)
}

/// Transfer frame: big-endian `counter` followed by up to four image bytes.
///
/// Bytes past [`CHUNK_SIZE`] are ignored; a short final chunk is not padded.
pub fn transfer_frame(counter: u32, chunk: &[u8]) -> CanFrame {
    let take = chunk.len().min(CHUNK_SIZE);
    let mut data = [0u8; MAX_PAYLOAD_LEN];
    BigEndian::write_u32(&mut data[..COUNTER_LEN], counter);
    data[COUNTER_LEN..COUNTER_LEN + take].copy_from_slice(&chunk[..take]);
    CanFrame {
        id: BOOTLOADER_ID,
        extended: false,
        data,
        len: (COUNTER_LEN + take) as u8,
    }
}

/// Read the sequence counter back out of a transfer frame.
pub fn transfer_counter(frame: &CanFrame) -> Option<u32> {
    let data = frame.data();
    if data.len() < COUNTER_LEN {
        return None;
    }
    Some(BigEndian::read_u32(&data[..COUNTER_LEN]))
}

/// Finalize frame closing a transfer.
pub fn finalize_frame() -> CanFrame {
    fixed(BOOTLOADER_ID, FINALIZE)
}
