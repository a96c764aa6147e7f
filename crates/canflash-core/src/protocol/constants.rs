//! Protocol constants for the CAN bootloader.
//!
//! Arbitration ids, command words and timing of the mute / boot / transfer
//! exchange. Every frame the engine emits is assembled from these values.

use std::time::Duration;

// ============================================================================
// Arbitration IDs
// ============================================================================

/// Sense board controller.
pub const SENSE_ID: u32 = 0x102;
/// Top board controller.
pub const TOP_ID: u32 = 0x103;
/// Bottom board controller.
pub const BOTTOM_ID: u32 = 0x104;

/// Bootloader command channel (transfer, finalize and mute frames).
pub const BOOTLOADER_ID: u32 = 0x09A;
/// Responses from any node in bootloader mode.
pub const RESPONSE_ID: u32 = 0x099;

/// Largest valid 11-bit standard id.
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Largest valid 29-bit extended id.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;
/// Classic CAN payload limit.
pub const MAX_PAYLOAD_LEN: usize = 8;

// ============================================================================
// Command words (Host -> Node)
// ============================================================================

/// Boot mode request: "!SWU" followed by four zero bytes.
pub const BOOT_REQUEST: [u8; 8] = [0x21, 0x53, 0x57, 0x55, 0x00, 0x00, 0x00, 0x00];

/// Mute prefix "SS".
pub const PREFIX_SS: [u8; 2] = [0x53, 0x53];
/// Mute prefix "PE".
pub const PREFIX_PE: [u8; 2] = [0x50, 0x45];
/// Bootloader mute prefix.
pub const PREFIX_FF00: [u8; 2] = [0xFF, 0x00];

/// Command body with the 0xFF selector.
pub const BODY_FF: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0x00, 0x00];
/// Command body with the 0x01 selector.
pub const BODY_01: [u8; 6] = [0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
/// All-zero command body.
pub const BODY_00: [u8; 6] = [0x00; 6];

/// Sent once after the last chunk is acknowledged.
pub const FINALIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

// ============================================================================
// Transfer framing
// ============================================================================

/// Size of the big-endian sequence counter at the start of a transfer frame.
pub const COUNTER_LEN: usize = 4;
/// Firmware bytes carried per transfer frame.
pub const CHUNK_SIZE: usize = MAX_PAYLOAD_LEN - COUNTER_LEN;

/// Polls between two sends of the same transfer frame.
pub const RESEND_EVERY_POLLS: u64 = 100;

// ============================================================================
// Timing
// ============================================================================

/// Spacing after every frame we put on the bus.
pub const INTER_FRAME_SPACING: Duration = Duration::from_micros(100);
/// Settle time after the mute sequence before boot negotiation.
pub const MUTE_SETTLE: Duration = Duration::from_secs(1);

/// Per-poll receive timeout during boot negotiation.
pub const BOOT_POLL_TIMEOUT: Duration = Duration::from_millis(500);
/// Smallest accepted boot timeout, in milliseconds.
pub const MIN_BOOT_TIMEOUT_MS: u64 = 1000;

/// Window during which the bus must stay quiet before a transfer.
pub const BUS_IDLE_WINDOW: Duration = Duration::from_secs(10);
/// Per-poll receive timeout during the idle check.
pub const BUS_IDLE_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Per-poll receive timeout while waiting for a chunk acknowledgment.
pub const ACK_POLL_TIMEOUT: Duration = Duration::from_millis(10);
/// Delay around the finalize frame.
pub const FINALIZE_SETTLE: Duration = Duration::from_millis(200);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_fit_standard_range() {
        for id in [SENSE_ID, TOP_ID, BOTTOM_ID, BOOTLOADER_ID, RESPONSE_ID] {
            assert!(id <= MAX_STANDARD_ID);
        }
    }

    #[test]
    fn test_boot_request_ascii() {
        assert_eq!(&BOOT_REQUEST[..4], b"!SWU");
        assert_eq!(&PREFIX_SS, b"SS");
        assert_eq!(&PREFIX_PE, b"PE");
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(CHUNK_SIZE, 4);
    }
}
