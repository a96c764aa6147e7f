//! Chunked firmware transfer.
//!
//! Three phases:
//! 1. Idle check: listen for [`BUS_IDLE_WINDOW`]; any frame not on the
//!    response id means another talker is active and the transfer is refused.
//! 2. Chunk loop: each 4-byte chunk travels behind a big-endian counter equal
//!    to its index. The frame is re-sent every [`RESEND_EVERY_POLLS`] polls
//!    until the target echoes it back byte for byte. Non-matching responses
//!    are counted as lost packets and never abort the loop.
//! 3. Finalize: settle, send [`finalize_frame`], settle.
//!
//! With no poll ceiling configured an unresponsive target keeps the chunk
//! loop running until cancelled.

use tracing::{debug, info, instrument, warn};

use crate::context::FlashContext;
use crate::error::FlashError;
use crate::events::{FlashEvent, FlashObserver, LogLevel};
use crate::progress::ProgressHandle;
use crate::protocol::constants::*;
use crate::protocol::{finalize_frame, transfer_frame};
use crate::transport::CanTransport;

/// Outcome of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferResult {
    pub bytes_sent: usize,
    pub chunks: usize,
    pub packets_lost: u64,
}

/// Live accounting of an active transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferState {
    /// Bytes acknowledged so far.
    pub bytes_processed: usize,
    pub total_bytes: usize,
    pub packets_lost: u64,
    /// Start offset of the last acknowledged chunk, if any.
    last_chunk_start: Option<usize>,
}

impl TransferState {
    pub fn new(total_bytes: usize) -> Self {
        Self {
            total_bytes,
            ..Self::default()
        }
    }

    /// Record the acknowledgment of the chunk starting at `start`.
    pub fn acknowledge(&mut self, start: usize, len: usize) {
        self.last_chunk_start = Some(start);
        self.bytes_processed = start + len;
    }

    /// `start / (total - 1) * 100` for the last acknowledged chunk.
    ///
    /// A one-byte (or empty) image jumps straight to 100 once its chunk is
    /// acknowledged.
    pub fn progress_percent(&self) -> f64 {
        match self.last_chunk_start {
            None => 0.0,
            Some(_) if self.total_bytes <= 1 => 100.0,
            Some(start) => start as f64 * 100.0 / (self.total_bytes - 1) as f64,
        }
    }
}

/// Runs phases 1 to 3 over an image.
#[derive(Debug, Clone, Default)]
pub struct FirmwareTransferer {
    max_chunk_polls: Option<u64>,
    progress: ProgressHandle,
}

impl FirmwareTransferer {
    pub fn new(progress: ProgressHandle) -> Self {
        Self {
            max_chunk_polls: None,
            progress,
        }
    }

    /// Give up on a chunk after `polls` unanswered polls.
    pub fn with_max_chunk_polls(mut self, polls: Option<u64>) -> Self {
        self.max_chunk_polls = polls;
        self
    }

    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    /// Transfer `image`. `in_boot_mode` must reflect a successful handshake.
    #[instrument(skip(self, ctx, image), fields(total = image.len()))]
    pub fn transfer<T, O>(
        &self,
        ctx: &FlashContext<'_, T, O>,
        image: &[u8],
        in_boot_mode: bool,
    ) -> Result<TransferResult, FlashError>
    where
        T: CanTransport + ?Sized,
        O: FlashObserver + ?Sized,
    {
        if !in_boot_mode {
            warn!("First put the uC on bootloading mode");
            ctx.log(LogLevel::Error, "First put the uC on bootloading mode");
            return Err(FlashError::NotInBootMode);
        }

        self.progress.reset();
        self.wait_bus_idle(ctx)?;

        let mut state = TransferState::new(image.len());
        let result = self.send_chunks(ctx, image, &mut state);
        if result.is_err() {
            self.progress.reset();
        }
        let chunks = result?;

        ctx.sleep(FINALIZE_SETTLE);
        ctx.send(&finalize_frame());
        ctx.sleep(FINALIZE_SETTLE);
        self.progress.reset();

        info!(bytes = state.total_bytes, packets_lost = state.packets_lost, "Data send!");
        ctx.emit(FlashEvent::Complete {
            bytes_sent: state.total_bytes,
            packets_lost: state.packets_lost,
        });
        Ok(TransferResult {
            bytes_sent: state.total_bytes,
            chunks,
            packets_lost: state.packets_lost,
        })
    }

    /// Phase 1: refuse to start while somebody else is talking.
    fn wait_bus_idle<T, O>(&self, ctx: &FlashContext<'_, T, O>) -> Result<(), FlashError>
    where
        T: CanTransport + ?Sized,
        O: FlashObserver + ?Sized,
    {
        info!(window_s = BUS_IDLE_WINDOW.as_secs(), "Checking if CAN is free");
        ctx.log(
            LogLevel::Info,
            format!("Checking if CAN is free for {}s", BUS_IDLE_WINDOW.as_secs()),
        );

        let start = ctx.clock.now();
        while ctx.clock.since(start) < BUS_IDLE_WINDOW {
            if let Some(frame) = ctx.poll(BUS_IDLE_POLL_TIMEOUT)?
                && !frame.has_id(RESPONSE_ID)
            {
                warn!(frame = %frame, "CAN bus busy");
                ctx.log(LogLevel::Error, "CAN bus busy");
                return Err(FlashError::BusBusy { id: frame.id() });
            }
        }

        info!("CAN bus free");
        ctx.log(LogLevel::Info, "CAN bus free");
        Ok(())
    }

    /// Phase 2. Returns the number of chunks sent.
    fn send_chunks<T, O>(
        &self,
        ctx: &FlashContext<'_, T, O>,
        image: &[u8],
        state: &mut TransferState,
    ) -> Result<usize, FlashError>
    where
        T: CanTransport + ?Sized,
        O: FlashObserver + ?Sized,
    {
        let mut chunks = 0;
        for (index, chunk) in image.chunks(CHUNK_SIZE).enumerate() {
            let counter = index as u32;
            let frame = transfer_frame(counter, chunk);
            let mut polls: u64 = 0;

            loop {
                if polls % RESEND_EVERY_POLLS == 0 {
                    ctx.send(&frame);
                }
                polls += 1;

                if let Some(ack) = ctx.poll(ACK_POLL_TIMEOUT)?
                    && ack.has_id(RESPONSE_ID)
                {
                    if ack.data() == frame.data() {
                        break;
                    }
                    state.packets_lost += 1;
                    debug!(counter, ack = %ack, "Unexpected acknowledgment");
                    ctx.emit(FlashEvent::PacketLost {
                        counter,
                        total_lost: state.packets_lost,
                    });
                }

                if let Some(limit) = self.max_chunk_polls
                    && polls >= limit
                {
                    warn!(counter, polls, "Target stopped acknowledging");
                    return Err(FlashError::Stalled { counter, polls });
                }
            }

            let start = index * CHUNK_SIZE;
            state.acknowledge(start, chunk.len());
            let percent = state.progress_percent();
            self.progress.set(percent);
            ctx.emit(FlashEvent::Progress {
                bytes_processed: state.bytes_processed,
                total_bytes: state.total_bytes,
                percent,
            });
            chunks += 1;
        }
        Ok(chunks)
    }
}
