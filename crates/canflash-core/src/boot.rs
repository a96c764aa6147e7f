//! Boot-mode handshake.
//!
//! Per attempt: send the boot request to the node's arbitration id, then poll
//! until the node answers on the response id with its success code or the
//! attempt times out. Responses carrying another node's code are ignored;
//! on a shared bus they may belong to a different handshake.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::context::FlashContext;
use crate::error::FlashError;
use crate::events::{FlashEvent, FlashObserver, LogLevel};
use crate::protocol::constants::{BOOT_POLL_TIMEOUT, RESPONSE_ID};
use crate::protocol::{CanFrame, NodeId, boot_request};
use crate::transport::CanTransport;

/// Result of a full negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Node acknowledged on attempt `attempt` (1-based).
    Entered { attempt: u32 },
    /// Every attempt timed out.
    Failed { attempts: u32 },
}

impl BootOutcome {
    pub fn is_entered(&self) -> bool {
        matches!(self, BootOutcome::Entered { .. })
    }
}

/// Drives the handshake against one target node.
#[derive(Debug, Clone, Copy)]
pub struct BootNegotiator {
    node: NodeId,
    timeout: Duration,
    max_attempts: u32,
}

impl BootNegotiator {
    pub fn new(node: NodeId, timeout: Duration, max_attempts: u32) -> Self {
        Self {
            node,
            timeout,
            max_attempts,
        }
    }

    /// Whether `frame` is this node's boot-mode acknowledgment.
    pub fn is_ack(&self, frame: &CanFrame) -> bool {
        frame.has_id(RESPONSE_ID) && frame.last_byte() == Some(self.node.success_code())
    }

    #[instrument(skip(self, ctx), fields(node = %self.node, max_attempts = self.max_attempts))]
    pub fn negotiate<T, O>(&self, ctx: &FlashContext<'_, T, O>) -> Result<BootOutcome, FlashError>
    where
        T: CanTransport + ?Sized,
        O: FlashObserver + ?Sized,
    {
        let request = boot_request(self.node);

        for attempt in 1..=self.max_attempts {
            info!(attempt, "Entering uC in bootloading mode");
            ctx.emit(FlashEvent::BootAttempt {
                node: self.node,
                attempt,
                max_attempts: self.max_attempts,
            });
            ctx.send(&request);

            let start = ctx.clock.now();
            loop {
                let elapsed = ctx.clock.since(start);
                if elapsed >= self.timeout {
                    warn!(attempt, max_attempts = self.max_attempts, "Boot request timed out");
                    ctx.log(
                        LogLevel::Warn,
                        format!("Timeout (attempt {}/{})", attempt, self.max_attempts),
                    );
                    break;
                }

                let wait = BOOT_POLL_TIMEOUT.min(self.timeout - elapsed);
                match ctx.poll(wait)? {
                    Some(frame) if self.is_ack(&frame) => {
                        info!(attempt, "uC on bootloading mode");
                        ctx.emit(FlashEvent::BootModeEntered {
                            node: self.node,
                            attempt,
                        });
                        return Ok(BootOutcome::Entered { attempt });
                    }
                    Some(frame) if frame.has_id(RESPONSE_ID) => {
                        debug!(frame = %frame, "Response for another node, ignoring");
                    }
                    _ => {}
                }
            }
        }

        warn!(node = %self.node, "Enter on bootloading mode failed");
        ctx.log(LogLevel::Error, "Enter on bootloading mode failed");
        Ok(BootOutcome::Failed {
            attempts: self.max_attempts,
        })
    }
}

/// Run the handshake; `true` once `node` confirms bootloader mode.
pub fn enter_boot_mode<T, O>(
    ctx: &FlashContext<'_, T, O>,
    node: NodeId,
    timeout: Duration,
    max_attempts: u32,
) -> Result<bool, FlashError>
where
    T: CanTransport + ?Sized,
    O: FlashObserver + ?Sized,
{
    BootNegotiator::new(node, timeout, max_attempts)
        .negotiate(ctx)
        .map(|outcome| outcome.is_entered())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::events::NullObserver;
    use crate::transport::{Clock, MockTransport, TransportError};

    const ONE_SECOND: Duration = Duration::from_millis(1000);

    fn response(code: u8) -> CanFrame {
        CanFrame::new(RESPONSE_ID, &[0x00, code]).unwrap()
    }

    fn answer_with(mock: &MockTransport, code: u8) {
        mock.set_responder(move |f| {
            if f.data() == crate::protocol::BOOT_REQUEST {
                vec![response(code)]
            } else {
                Vec::new()
            }
        });
    }

    #[test]
    fn test_each_node_accepts_only_its_code() {
        for node in NodeId::ALL {
            for other in NodeId::ALL {
                let mock = MockTransport::new();
                let clock = mock.clock();
                let cancel = CancelToken::new();
                let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);
                answer_with(&mock, other.success_code());

                let entered = enter_boot_mode(&ctx, node, ONE_SECOND, 2).unwrap();
                assert_eq!(entered, node == other, "{} answered by {}", node, other);
            }
        }
    }

    #[test]
    fn test_request_addressed_to_node() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);
        answer_with(&mock, NodeId::Sense.success_code());

        assert!(enter_boot_mode(&ctx, NodeId::Sense, ONE_SECOND, 1).unwrap());
        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id(), 0x102);
    }

    #[test]
    fn test_mismatched_code_keeps_polling() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);

        mock.queue_frame_at(Duration::from_millis(100), response(4));
        mock.queue_frame_at(Duration::from_millis(200), response(2));
        mock.queue_frame_at(Duration::from_millis(700), response(3));

        let outcome = BootNegotiator::new(NodeId::Top, ONE_SECOND, 1)
            .negotiate(&ctx)
            .unwrap();
        assert_eq!(outcome, BootOutcome::Entered { attempt: 1 });
        assert_eq!(mock.sent().len(), 1);
    }

    #[test]
    fn test_attempts_exhausted() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);

        let outcome = BootNegotiator::new(NodeId::Bottom, ONE_SECOND, 3)
            .negotiate(&ctx)
            .unwrap();
        assert_eq!(outcome, BootOutcome::Failed { attempts: 3 });
        assert_eq!(mock.sent().len(), 3);
        assert!(clock.now() >= ONE_SECOND * 3);
        assert!(clock.now() < ONE_SECOND * 3 + Duration::from_millis(1));
    }

    #[test]
    fn test_success_on_second_attempt() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);

        mock.queue_frame_at(Duration::from_millis(1500), response(3));

        let outcome = BootNegotiator::new(NodeId::Top, ONE_SECOND, 2)
            .negotiate(&ctx)
            .unwrap();
        assert_eq!(outcome, BootOutcome::Entered { attempt: 2 });
        assert_eq!(mock.sent().len(), 2);
    }

    #[test]
    fn test_response_after_total_window_is_missed() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);

        mock.queue_frame_at(Duration::from_millis(2500), response(3));

        assert!(!enter_boot_mode(&ctx, NodeId::Top, ONE_SECOND, 2).unwrap());
        assert_eq!(mock.pending(), 1);
    }

    #[test]
    fn test_foreign_traffic_ignored() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);

        mock.queue_frame(CanFrame::new(0x300, &[3]).unwrap());
        mock.queue_frame(CanFrame::new_extended(RESPONSE_ID, &[3]).unwrap());
        mock.queue_frame_at(Duration::from_millis(50), response(3));

        assert!(enter_boot_mode(&ctx, NodeId::Top, ONE_SECOND, 1).unwrap());
    }

    #[test]
    fn test_cancelled() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);
        cancel.cancel();

        let result = enter_boot_mode(&ctx, NodeId::Top, ONE_SECOND, 5);
        assert!(matches!(result, Err(FlashError::Cancelled)));
        // The request of the first attempt still went out
        assert_eq!(mock.sent().len(), 1);
    }

    #[test]
    fn test_failed_request_retried_next_attempt() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);
        answer_with(&mock, NodeId::Top.success_code());
        mock.fail_next_sends(1);

        let outcome = BootNegotiator::new(NodeId::Top, ONE_SECOND, 2)
            .negotiate(&ctx)
            .unwrap();
        assert_eq!(outcome, BootOutcome::Entered { attempt: 2 });
        // Only the second request reached the bus
        assert_eq!(mock.sent().len(), 1);
        assert!(clock.now() >= ONE_SECOND);
    }

    #[test]
    fn test_receive_errors_still_time_out() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);
        mock.fail_next_recvs(usize::MAX);

        let outcome = BootNegotiator::new(NodeId::Top, ONE_SECOND, 2)
            .negotiate(&ctx)
            .unwrap();
        assert_eq!(outcome, BootOutcome::Failed { attempts: 2 });
        assert_eq!(mock.sent().len(), 2);
        assert!(clock.now() >= ONE_SECOND * 2);
        assert!(clock.now() < ONE_SECOND * 2 + Duration::from_millis(1));
    }

    #[test]
    fn test_disconnect_aborts_handshake() {
        let mock = MockTransport::new();
        let clock = mock.clock();
        let cancel = CancelToken::new();
        let ctx = FlashContext::new(&mock, &clock, &NullObserver, &cancel);
        mock.disconnect();

        let result = enter_boot_mode(&ctx, NodeId::Top, ONE_SECOND, 3);
        assert!(matches!(
            result,
            Err(FlashError::Transport(TransportError::Disconnected))
        ));
        // No further attempts after the first poll failed
        assert!(clock.now() < ONE_SECOND);
    }
}
