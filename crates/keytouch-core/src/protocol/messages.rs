//! Control packet types for the fast touch/key channel.
//!
//! Every packet starts with a one-byte tag.  The receiver infers the packet
//! length from the tag alone (only [`PacketTag::TouchBatch`] carries an
//! explicit count), so there is no length prefix.  Multi-byte integers are
//! big-endian.

use serde::{Deserialize, Serialize};

// ── Packet sizes ──────────────────────────────────────────────────────────────

/// Touch Down/Up/Move: tag, seq-low, x(2), y(2).
pub const TOUCH_PACKET_SIZE: usize = 6;
/// Touch Reset and Disconnect: tag only.
pub const TAG_ONLY_PACKET_SIZE: usize = 1;
/// Key Down/Up: tag, keycode(2).
pub const KEY_PACKET_SIZE: usize = 3;
/// Batch header: tag, count.
pub const BATCH_HEADER_SIZE: usize = 2;
/// One batch entry: seq-low, action, x(2), y(2).
pub const BATCH_ENTRY_SIZE: usize = 6;
/// Largest number of entries a batch can carry (the count is one byte).
pub const MAX_BATCH_ENTRIES: usize = u8::MAX as usize;

/// Largest wire coordinate; normalized `1.0` maps here.
pub const WIRE_COORD_MAX: u16 = u16::MAX;

// ── Tags ──────────────────────────────────────────────────────────────────────

/// First byte of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketTag {
    TouchDown = 10,
    TouchUp = 11,
    TouchMove = 12,
    TouchReset = 13,
    KeyDown = 14,
    KeyUp = 15,
    TouchBatch = 16,
    Disconnect = 0xFF,
}

impl TryFrom<u8> for PacketTag {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            10 => Ok(PacketTag::TouchDown),
            11 => Ok(PacketTag::TouchUp),
            12 => Ok(PacketTag::TouchMove),
            13 => Ok(PacketTag::TouchReset),
            14 => Ok(PacketTag::KeyDown),
            15 => Ok(PacketTag::KeyUp),
            16 => Ok(PacketTag::TouchBatch),
            0xFF => Ok(PacketTag::Disconnect),
            _ => Err(()),
        }
    }
}

// ── Actions ───────────────────────────────────────────────────────────────────

/// Phase of a virtual touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TouchAction {
    Down = 0,
    Up = 1,
    Move = 2,
    Reset = 3,
}

impl TouchAction {
    /// Tag used when the action is sent as a standalone packet.
    pub fn tag(self) -> PacketTag {
        match self {
            TouchAction::Down => PacketTag::TouchDown,
            TouchAction::Up => PacketTag::TouchUp,
            TouchAction::Move => PacketTag::TouchMove,
            TouchAction::Reset => PacketTag::TouchReset,
        }
    }
}

impl TryFrom<u8> for TouchAction {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(TouchAction::Down),
            1 => Ok(TouchAction::Up),
            2 => Ok(TouchAction::Move),
            3 => Ok(TouchAction::Reset),
            _ => Err(()),
        }
    }
}

/// Phase of a virtual key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyAction {
    Down = 0,
    Up = 1,
}

impl KeyAction {
    pub fn tag(self) -> PacketTag {
        match self {
            KeyAction::Down => PacketTag::KeyDown,
            KeyAction::Up => PacketTag::KeyUp,
        }
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

/// One virtual-touch sample.
///
/// `x`/`y` are normalized coordinates scaled to `0..=65535`.  Only the low
/// eight bits of `seq_id` reach the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchEvent {
    pub seq_id: u32,
    pub action: TouchAction,
    pub x: u16,
    pub y: u16,
}

impl TouchEvent {
    pub fn new(seq_id: u32, action: TouchAction, x: u16, y: u16) -> Self {
        Self { seq_id, action, x, y }
    }

    /// Low byte of the sequence id as transmitted.
    pub fn wire_seq(&self) -> u8 {
        (self.seq_id & 0xFF) as u8
    }
}

/// One virtual key transition, carrying an Android keycode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub keycode: u16,
}

/// A packet as seen by a receiver.  Produced by
/// [`crate::protocol::codec::decode_packet`], which exists for tooling and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Touch Down/Up/Move.  `seq` is the low byte only.
    Touch {
        seq: u8,
        action: TouchAction,
        x: u16,
        y: u16,
    },
    TouchReset,
    Key(KeyEvent),
    Batch(Vec<(u8, TouchAction, u16, u16)>),
    Disconnect,
}
