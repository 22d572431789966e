//! A sink that keeps every packet in memory.
//!
//! Integration tests wire a session to a `RecordingSink` and assert on the
//! decoded packets.  `set_failing(true)` makes every send report failure, to
//! exercise the fire-and-forget path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use keytouch_core::protocol::{decode_packet, Packet};
use keytouch_core::TouchAction;
use tracing::warn;

use crate::application::output::ControlSink;

#[derive(Debug, Default)]
pub struct RecordingSink {
    buffers: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Raw buffers in send order.
    pub fn buffers(&self) -> Vec<Vec<u8>> {
        crate::application::lock(&self.buffers).clone()
    }

    /// Every buffer decoded.  Undecodable buffers are skipped with a warning.
    pub fn packets(&self) -> Vec<Packet> {
        self.buffers()
            .iter()
            .filter_map(|b| match decode_packet(b) {
                Ok((packet, _)) => Some(packet),
                Err(e) => {
                    warn!(error = %e, "recorded buffer does not decode");
                    None
                }
            })
            .collect()
    }

    /// Touch packets as `(seq, action, x, y)`.
    pub fn touches(&self) -> Vec<(u8, TouchAction, u16, u16)> {
        self.packets()
            .into_iter()
            .filter_map(|p| match p {
                Packet::Touch { seq, action, x, y } => Some((seq, action, x, y)),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        crate::application::lock(&self.buffers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        crate::application::lock(&self.buffers).clear();
    }
}

impl ControlSink for RecordingSink {
    fn send(&self, bytes: &[u8]) -> i64 {
        if self.failing.load(Ordering::Relaxed) {
            return -1;
        }
        crate::application::lock(&self.buffers).push(bytes.to_vec());
        bytes.len() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::output::ControlChannel;
    use keytouch_core::{KeyAction, PointF, TouchSequence};
    use std::sync::Arc;

    #[test]
    fn test_records_and_decodes_in_order() {
        // Arrange
        let sink = Arc::new(RecordingSink::new());
        let out = ControlChannel::new(sink.clone(), Arc::new(TouchSequence::new()));

        // Act
        out.send_touch(3, TouchAction::Down, PointF::new(0.0, 1.0));
        out.send_key(KeyAction::Up, 66);

        // Assert
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.touches(), vec![(3, TouchAction::Down, 0, u16::MAX)]);
        assert!(matches!(sink.packets()[1], Packet::Key(_)));
    }

    #[test]
    fn test_failing_sink_records_nothing() {
        let sink = Arc::new(RecordingSink::new());
        sink.set_failing(true);
        let out = ControlChannel::new(sink.clone(), Arc::new(TouchSequence::new()));

        assert!(!out.send_touch(1, TouchAction::Up, PointF::CENTER));
        assert!(sink.is_empty());
    }
}
