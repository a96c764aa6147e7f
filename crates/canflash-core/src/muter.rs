//! Bus muting: silence and restore the periodic traffic of the peer nodes.
//!
//! Neither sequence is acknowledged. Every command goes out twice and a lost
//! frame is covered by its twin.

use tracing::{info, instrument};

use crate::context::FlashContext;
use crate::events::{FlashObserver, LogLevel};
use crate::protocol::constants::{BOOTLOADER_ID, BOTTOM_ID, MUTE_SETTLE, SENSE_ID, TOP_ID};
use crate::protocol::{CanFrame, Command, command_frame};
use crate::transport::CanTransport;

/// One step of a sequence: command, destination, number of sends.
type Step = (u32, Command, usize);

/// Top, Sense, Bottom, then the bootloader channel.
pub const MUTE_SEQUENCE: &[Step] = &[
    (TOP_ID, Command::SilenceFf, 2),
    (TOP_ID, Command::PeZero, 2),
    (SENSE_ID, Command::SilenceFf, 2),
    (SENSE_ID, Command::PeZero, 2),
    (BOTTOM_ID, Command::SilenceFf, 2),
    (BOTTOM_ID, Command::PeZero, 2),
    (BOTTOM_ID, Command::SilenceZero, 1),
    (BOOTLOADER_ID, Command::BootloaderHold, 2),
];

pub const UNMUTE_SEQUENCE: &[Step] = &[
    (TOP_ID, Command::PeOne, 2),
    (SENSE_ID, Command::SilenceFf, 2),
    (SENSE_ID, Command::PeZero, 2),
    (BOTTOM_ID, Command::SilenceFf, 2),
    (BOTTOM_ID, Command::PeZero, 2),
    (BOOTLOADER_ID, Command::BootloaderHold, 2),
];

/// Expand a sequence into the frames it puts on the bus, in order.
pub fn expand(sequence: &[Step]) -> Vec<CanFrame> {
    sequence
        .iter()
        .flat_map(|&(id, command, repeat)| std::iter::repeat_n(command_frame(id, command), repeat))
        .collect()
}

fn play<T, O>(ctx: &FlashContext<'_, T, O>, sequence: &[Step]) -> usize
where
    T: CanTransport + ?Sized,
    O: FlashObserver + ?Sized,
{
    expand(sequence)
        .iter()
        .filter(|frame| ctx.send(frame))
        .count()
}

/// Silence the bus, then wait for the nodes to honor it.
///
/// Returns the number of frames the transport accepted.
#[instrument(skip(ctx))]
pub fn mute<T, O>(ctx: &FlashContext<'_, T, O>) -> usize
where
    T: CanTransport + ?Sized,
    O: FlashObserver + ?Sized,
{
    info!("Muting CAN bus");
    ctx.log(LogLevel::Info, "Muting CAN bus");
    let sent = play(ctx, MUTE_SEQUENCE);
    ctx.sleep(MUTE_SETTLE);
    sent
}

/// Restore normal bus traffic.
#[instrument(skip(ctx))]
pub fn unmute<T, O>(ctx: &FlashContext<'_, T, O>) -> usize
where
    T: CanTransport + ?Sized,
    O: FlashObserver + ?Sized,
{
    info!("Unmuting CAN bus");
    ctx.log(LogLevel::Info, "Unmuting CAN bus");
    play(ctx, UNMUTE_SEQUENCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::events::NullObserver;
    use crate::transport::{Clock, MockTransport};
    use std::time::Duration;

    fn ids(frames: &[CanFrame]) -> Vec<u32> {
        frames.iter().map(|f| f.id()).collect()
    }

    #[test]
    fn test_mute_frame_order() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);

        assert_eq!(mute(&ctx), 15);

        let sent = mock.sent();
        let mut expected = vec![TOP_ID; 4];
        expected.extend([SENSE_ID; 4]);
        expected.extend([BOTTOM_ID; 5]);
        expected.extend([BOOTLOADER_ID; 2]);
        assert_eq!(ids(&sent), expected);
    }

    #[test]
    fn test_mute_pairs_identical() {
        let frames = expand(MUTE_SEQUENCE);
        for pair in [(0, 1), (2, 3), (4, 5), (6, 7), (8, 9), (10, 11), (13, 14)] {
            assert_eq!(frames[pair.0], frames[pair.1]);
        }
        // Bottom gets a single extra all-zero silence word
        assert_eq!(frames[12].data(), &[0x53, 0x53, 0, 0, 0, 0, 0, 0]);
        assert_eq!(frames[0].data(), &[0x53, 0x53, 0, 0, 0xFF, 0, 0, 0]);
        assert_eq!(frames[2].data(), &[0x50, 0x45, 0, 0, 0, 0, 0, 0]);
        assert_eq!(frames[13].data(), &[0xFF, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_mute_waits_settle_delay() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);

        mute(&ctx);
        // 15 spaced frames plus the settle delay
        let expected = MUTE_SETTLE + Duration::from_micros(100) * 15;
        assert_eq!(clock.now(), expected);
    }

    #[test]
    fn test_unmute_sequence() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);

        assert_eq!(unmute(&ctx), 12);
        let sent = mock.sent();
        assert_eq!(sent[0].id(), TOP_ID);
        assert_eq!(sent[0].data(), &[0x50, 0x45, 0, 0, 0x01, 0, 0, 0]);
        assert_eq!(sent[1], sent[0]);
        assert_eq!(&ids(&sent)[2..6], &[SENSE_ID; 4]);
        assert_eq!(&ids(&sent)[6..10], &[BOTTOM_ID; 4]);
        assert_eq!(&ids(&sent)[10..], &[BOOTLOADER_ID; 2]);
        // No settle delay after unmute
        assert_eq!(clock.now(), Duration::from_micros(100) * 12);
    }

    #[test]
    fn test_send_failures_do_not_abort() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);

        mock.fail_next_sends(3);
        assert_eq!(mute(&ctx), 12);
        assert_eq!(mock.sent().len(), 12);
    }
}
