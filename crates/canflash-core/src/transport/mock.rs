//! Mock CAN transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::clock::{Clock, SimClock};
use super::traits::{CanTransport, TransportError};
use crate::protocol::CanFrame;

type Responder = Box<dyn FnMut(&CanFrame) -> Vec<CanFrame> + Send>;

/// Mock transport for unit testing protocol logic.
///
/// Runs on a [`SimClock`]: a `recv` that finds nothing advances virtual time
/// by its full timeout, a `recv` that finds a scheduled frame advances time to
/// the frame's arrival.
pub struct MockTransport {
    clock: SimClock,
    /// Frames waiting to be received, with their arrival time.
    rx_queue: Arc<Mutex<VecDeque<(Duration, CanFrame)>>>,
    /// Captured sends.
    tx_log: Arc<Mutex<Vec<CanFrame>>>,
    /// Produces replies for every successful send.
    responder: Mutex<Option<Responder>>,
    /// Number of upcoming sends that fail.
    failing_sends: Arc<Mutex<usize>>,
    /// Number of upcoming receives that fail without consuming time.
    failing_recvs: Arc<Mutex<usize>>,
    /// Whether the interface is "up".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_clock(SimClock::new())
    }

    pub fn with_clock(clock: SimClock) -> Self {
        Self {
            clock,
            rx_queue: Arc::new(Mutex::new(VecDeque::new())),
            tx_log: Arc::new(Mutex::new(Vec::new())),
            responder: Mutex::new(None),
            failing_sends: Arc::new(Mutex::new(0)),
            failing_recvs: Arc::new(Mutex::new(0)),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// The virtual clock this transport advances.
    pub fn clock(&self) -> SimClock {
        self.clock.clone()
    }

    /// Queue a frame that is available immediately.
    pub fn queue_frame(&self, frame: CanFrame) {
        let now = self.clock.now();
        self.rx_queue.lock().unwrap().push_back((now, frame));
    }

    /// Queue a frame arriving at virtual time `at`.
    ///
    /// Frames are delivered in queue order; queue them in arrival order.
    pub fn queue_frame_at(&self, at: Duration, frame: CanFrame) {
        self.rx_queue.lock().unwrap().push_back((at, frame));
    }

    /// Install a closure that answers every sent frame.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&CanFrame) -> Vec<CanFrame> + Send + 'static,
    {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    /// Make the next `count` sends fail.
    pub fn fail_next_sends(&self, count: usize) {
        *self.failing_sends.lock().unwrap() = count;
    }

    /// Make the next `count` receives fail with
    /// [`TransportError::ReceiveFailed`]. Failed receives return at once and
    /// leave the clock untouched.
    pub fn fail_next_recvs(&self, count: usize) {
        *self.failing_recvs.lock().unwrap() = count;
    }

    /// Get all captured sends.
    pub fn sent(&self) -> Vec<CanFrame> {
        self.tx_log.lock().unwrap().clone()
    }

    /// Captured sends addressed to `id`.
    pub fn sent_to(&self, id: u32) -> Vec<CanFrame> {
        self.sent().into_iter().filter(|f| f.has_id(id)).collect()
    }

    /// Clear captured sends.
    pub fn clear_sent(&self) {
        self.tx_log.lock().unwrap().clear();
    }

    /// Frames still waiting to be received.
    pub fn pending(&self) -> usize {
        self.rx_queue.lock().unwrap().len()
    }

    /// Simulate the interface going down.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate the interface coming back.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CanTransport for MockTransport {
    fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        {
            let mut failing = self.failing_sends.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(TransportError::SendFailed("injected failure".into()));
            }
        }
        self.tx_log.lock().unwrap().push(*frame);

        let replies = match self.responder.lock().unwrap().as_mut() {
            Some(responder) => responder(frame),
            None => Vec::new(),
        };
        let now = self.clock.now();
        let mut queue = self.rx_queue.lock().unwrap();
        for reply in replies {
            queue.push_back((now, reply));
        }
        Ok(())
    }

    fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        {
            let mut failing = self.failing_recvs.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(TransportError::ReceiveFailed("injected failure".into()));
            }
        }
        let now = self.clock.now();
        let mut queue = self.rx_queue.lock().unwrap();
        match queue.front() {
            Some((at, _)) if *at <= now + timeout => {
                self.clock.advance_to(*at);
                Ok(queue.pop_front().map(|(_, frame)| frame))
            }
            _ => {
                self.clock.advance(timeout);
                Ok(None)
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::*;

    fn frame(id: u32, data: &[u8]) -> CanFrame {
        CanFrame::new(id, data).unwrap()
    }

    #[test]
    fn test_mock_recv_queue() {
        let mock = MockTransport::new();
        mock.queue_frame(frame(RESPONSE_ID, &[1]));
        mock.queue_frame(frame(RESPONSE_ID, &[2]));

        let timeout = Duration::from_millis(10);
        assert_eq!(mock.recv(timeout).unwrap().unwrap().data(), &[1]);
        assert_eq!(mock.recv(timeout).unwrap().unwrap().data(), &[2]);

        // Queue is empty now; the timeout is consumed in virtual time
        let before = mock.clock().now();
        assert!(mock.recv(timeout).unwrap().is_none());
        assert_eq!(mock.clock().since(before), timeout);
    }

    #[test]
    fn test_mock_scheduled_frame() {
        let mock = MockTransport::new();
        mock.queue_frame_at(Duration::from_millis(250), frame(0x200, &[]));

        assert!(mock.recv(Duration::from_millis(100)).unwrap().is_none());
        assert!(mock.recv(Duration::from_millis(100)).unwrap().is_none());
        let f = mock.recv(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(f.id(), 0x200);
        assert_eq!(mock.clock().now(), Duration::from_millis(250));
    }

    #[test]
    fn test_mock_send_capture_and_responder() {
        let mock = MockTransport::new();
        mock.set_responder(|f| vec![CanFrame::new(RESPONSE_ID, f.data()).unwrap()]);

        mock.send(&frame(BOOTLOADER_ID, b"Hello")).unwrap();
        mock.send(&frame(TOP_ID, b"World")).unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].data(), b"Hello");
        assert_eq!(mock.sent_to(TOP_ID).len(), 1);
        assert_eq!(mock.pending(), 2);
    }

    #[test]
    fn test_mock_failing_sends() {
        let mock = MockTransport::new();
        mock.fail_next_sends(1);
        assert!(mock.send(&frame(TOP_ID, &[])).is_err());
        assert!(mock.send(&frame(TOP_ID, &[])).is_ok());
        assert_eq!(mock.sent().len(), 1);
    }

    #[test]
    fn test_mock_failing_recvs() {
        let mock = MockTransport::new();
        mock.queue_frame(frame(RESPONSE_ID, &[1]));
        mock.fail_next_recvs(2);

        let timeout = Duration::from_millis(10);
        assert!(matches!(
            mock.recv(timeout),
            Err(TransportError::ReceiveFailed(_))
        ));
        assert!(mock.recv(timeout).is_err());
        assert_eq!(mock.clock().now(), Duration::ZERO);
        assert_eq!(mock.recv(timeout).unwrap().unwrap().data(), &[1]);
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        mock.disconnect();
        assert!(mock.send(&frame(TOP_ID, &[])).is_err());
        assert!(matches!(
            mock.recv(Duration::from_millis(1)),
            Err(TransportError::Disconnected)
        ));
        mock.reconnect();
        assert!(mock.send(&frame(TOP_ID, &[])).is_ok());
    }
}
