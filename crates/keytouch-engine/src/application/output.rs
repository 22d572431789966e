//! The control-channel output port.
//!
//! Every producer in the engine (gesture handlers, the script bridge, the
//! facade) ends up writing small binary packets to one [`ControlSink`].  The
//! sink is owned by whoever embeds the engine (a socket, a recorder in tests,
//! a logger in the headless runner) and is injected as an `Arc<dyn ControlSink>`.
//!
//! [`ControlChannel`] bundles the sink with the shared [`TouchSequence`] so a
//! handler can issue a new touch id and emit a packet without knowing either
//! the wire layout or the transport.

use std::sync::Arc;

use keytouch_core::protocol::codec::{
    encode_batch, encode_key_into, encode_touch_into, encode_touch_reset_into,
};
use keytouch_core::protocol::messages::TOUCH_PACKET_SIZE;
use keytouch_core::{to_wire, KeyAction, KeyEvent, PointF, TouchAction, TouchEvent, TouchSequence};
use tracing::{trace, warn};

/// Destination for encoded control packets.
///
/// `send` returns the number of bytes written, or a negative value when the
/// transport refused the packet.  The engine never retries: a failed write
/// is logged and dropped.
pub trait ControlSink: Send + Sync {
    fn send(&self, bytes: &[u8]) -> i64;
}

/// Cheap-to-clone handle for emitting touch and key packets.
#[derive(Clone)]
pub struct ControlChannel {
    sink: Arc<dyn ControlSink>,
    sequence: Arc<TouchSequence>,
}

impl ControlChannel {
    pub fn new(sink: Arc<dyn ControlSink>, sequence: Arc<TouchSequence>) -> Self {
        Self { sink, sequence }
    }

    /// Issues a fresh touch-sequence id.
    pub fn next_seq(&self) -> u32 {
        self.sequence.next()
    }

    pub fn sequence(&self) -> &Arc<TouchSequence> {
        &self.sequence
    }

    pub fn sink(&self) -> &Arc<dyn ControlSink> {
        &self.sink
    }

    /// Sends a touch at a normalized position.
    pub fn send_touch(&self, seq_id: u32, action: TouchAction, pos: PointF) -> bool {
        self.send_touch_raw(seq_id, action, to_wire(pos.x), to_wire(pos.y))
    }

    /// Sends a touch at wire coordinates (`0..=65535`).
    pub fn send_touch_raw(&self, seq_id: u32, action: TouchAction, x: u16, y: u16) -> bool {
        let event = TouchEvent::new(seq_id, action, x, y);
        let mut buf = [0u8; TOUCH_PACKET_SIZE];
        match encode_touch_into(&event, &mut buf) {
            Ok(n) => {
                trace!(seq_id, ?action, x, y, "touch");
                self.write(&buf[..n])
            }
            Err(e) => {
                warn!("touch encode failed: {e}");
                false
            }
        }
    }

    pub fn send_key(&self, action: KeyAction, keycode: u16) -> bool {
        let event = KeyEvent { action, keycode };
        let mut buf = [0u8; 3];
        match encode_key_into(&event, &mut buf) {
            Ok(n) => {
                trace!(?action, keycode, "key");
                self.write(&buf[..n])
            }
            Err(e) => {
                warn!("key encode failed: {e}");
                false
            }
        }
    }

    /// Sends several touches as one batch packet so they land in the same
    /// input frame on the device.
    pub fn send_touch_batch(&self, touches: &[(u32, TouchAction, PointF)]) -> bool {
        let events: Vec<TouchEvent> = touches
            .iter()
            .map(|&(seq_id, action, pos)| TouchEvent::new(seq_id, action, to_wire(pos.x), to_wire(pos.y)))
            .collect();
        match encode_batch(&events) {
            Ok(bytes) => self.write(&bytes),
            Err(e) => {
                warn!("batch encode failed: {e}");
                false
            }
        }
    }

    /// Tells the device to drop every active touch.
    pub fn send_touch_reset(&self) -> bool {
        let mut buf = [0u8; 1];
        match encode_touch_reset_into(&mut buf) {
            Ok(n) => self.write(&buf[..n]),
            Err(e) => {
                warn!("reset encode failed: {e}");
                false
            }
        }
    }

    fn write(&self, bytes: &[u8]) -> bool {
        let written = self.sink.send(bytes);
        if written < 0 {
            warn!(written, len = bytes.len(), "control sink rejected packet");
            return false;
        }
        true
    }
}
