//! Fixed-layout binary codec for the fast touch/key channel.
//!
//! Wire format (all multi-byte integers big-endian):
//! ```text
//! Touch Down/Up/Move : [tag:1][seq_lo:1][x:2][y:2]                 6 bytes
//! Touch Reset        : [tag:1]                                     1 byte
//! Key Down/Up        : [tag:1][keycode:2]                          3 bytes
//! Batch              : [tag:1][count:1] N × [seq_lo:1][action:1][x:2][y:2]
//! Disconnect         : [tag:1]                                     1 byte
//! ```
//!
//! The `encode_*_into` functions write into a caller-provided buffer and
//! return the number of bytes written, so the hot path never touches the
//! heap.  The `encode_*` variants return an owned `Vec<u8>` for convenience.

use thiserror::Error;

use crate::protocol::messages::{
    KeyAction, KeyEvent, Packet, PacketTag, TouchAction, TouchEvent, BATCH_ENTRY_SIZE,
    BATCH_HEADER_SIZE, KEY_PACKET_SIZE, MAX_BATCH_ENTRIES, TAG_ONLY_PACKET_SIZE,
    TOUCH_PACKET_SIZE, WIRE_COORD_MAX,
};

/// Errors raised by the codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The destination buffer cannot hold the packet.
    #[error("buffer too small: need {needed} bytes, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// A batch was given more entries than its one-byte count can describe.
    #[error("batch of {0} entries exceeds the 255-entry limit")]
    BatchTooLarge(usize),

    /// Not enough bytes to decode the packet announced by the tag.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The tag byte is not a known packet type.
    #[error("unknown packet tag: 0x{0:02X}")]
    UnknownTag(u8),

    /// A batch entry carries an action byte outside the known set.
    #[error("unknown touch action: {0}")]
    UnknownAction(u8),
}

// ── Coordinates ───────────────────────────────────────────────────────────────

/// Converts a normalized coordinate to its wire value.
///
/// Input is clamped to `0.0..=1.0` first; `NaN` maps to `0`.
///
/// ```rust
/// use keytouch_core::protocol::codec::to_wire;
///
/// assert_eq!(to_wire(0.0), 0);
/// assert_eq!(to_wire(1.0), 65535);
/// assert_eq!(to_wire(2.0), 65535);
/// ```
pub fn to_wire(normalized: f64) -> u16 {
    if normalized.is_nan() {
        return 0;
    }
    (normalized.clamp(0.0, 1.0) * f64::from(WIRE_COORD_MAX)) as u16
}

// ── Zero-allocation encoders ──────────────────────────────────────────────────

/// Writes a 6-byte Touch Down/Up/Move packet.
///
/// A `TouchAction::Reset` event is written as the 1-byte reset packet.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] if `buf` cannot hold the packet.
pub fn encode_touch_into(event: &TouchEvent, buf: &mut [u8]) -> Result<usize, CodecError> {
    if event.action == TouchAction::Reset {
        return encode_touch_reset_into(buf);
    }
    ensure_capacity(buf, TOUCH_PACKET_SIZE)?;
    buf[0] = event.action.tag() as u8;
    buf[1] = event.wire_seq();
    buf[2..4].copy_from_slice(&event.x.to_be_bytes());
    buf[4..6].copy_from_slice(&event.y.to_be_bytes());
    Ok(TOUCH_PACKET_SIZE)
}

/// Writes the 1-byte Touch Reset packet.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] if `buf` is empty.
pub fn encode_touch_reset_into(buf: &mut [u8]) -> Result<usize, CodecError> {
    ensure_capacity(buf, TAG_ONLY_PACKET_SIZE)?;
    buf[0] = PacketTag::TouchReset as u8;
    Ok(TAG_ONLY_PACKET_SIZE)
}

/// Writes a 3-byte Key Down/Up packet.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] if `buf` cannot hold the packet.
pub fn encode_key_into(event: &KeyEvent, buf: &mut [u8]) -> Result<usize, CodecError> {
    ensure_capacity(buf, KEY_PACKET_SIZE)?;
    buf[0] = event.action.tag() as u8;
    buf[1..3].copy_from_slice(&event.keycode.to_be_bytes());
    Ok(KEY_PACKET_SIZE)
}

/// Writes a key click (Down immediately followed by Up), 6 bytes total.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] if `buf` cannot hold both packets.
pub fn encode_key_click_into(keycode: u16, buf: &mut [u8]) -> Result<usize, CodecError> {
    ensure_capacity(buf, KEY_PACKET_SIZE * 2)?;
    let down = encode_key_into(&KeyEvent { action: KeyAction::Down, keycode }, buf)?;
    let up = encode_key_into(
        &KeyEvent { action: KeyAction::Up, keycode },
        &mut buf[down..],
    )?;
    Ok(down + up)
}

/// Writes a batch of touch samples as one `2 + 6N` byte packet.
///
/// An empty slice writes nothing and returns `Ok(0)`.
///
/// # Errors
///
/// Returns [`CodecError::BatchTooLarge`] for more than 255 events and
/// [`CodecError::BufferTooSmall`] if `buf` cannot hold the packet.
pub fn encode_batch_into(events: &[TouchEvent], buf: &mut [u8]) -> Result<usize, CodecError> {
    if events.is_empty() {
        return Ok(0);
    }
    if events.len() > MAX_BATCH_ENTRIES {
        return Err(CodecError::BatchTooLarge(events.len()));
    }
    let needed = batch_size(events.len());
    ensure_capacity(buf, needed)?;

    buf[0] = PacketTag::TouchBatch as u8;
    buf[1] = events.len() as u8;
    for (i, event) in events.iter().enumerate() {
        let at = BATCH_HEADER_SIZE + i * BATCH_ENTRY_SIZE;
        buf[at] = event.wire_seq();
        buf[at + 1] = event.action as u8;
        buf[at + 2..at + 4].copy_from_slice(&event.x.to_be_bytes());
        buf[at + 4..at + 6].copy_from_slice(&event.y.to_be_bytes());
    }
    Ok(needed)
}

/// Writes the 1-byte Disconnect packet.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] if `buf` is empty.
pub fn encode_disconnect_into(buf: &mut [u8]) -> Result<usize, CodecError> {
    ensure_capacity(buf, TAG_ONLY_PACKET_SIZE)?;
    buf[0] = PacketTag::Disconnect as u8;
    Ok(TAG_ONLY_PACKET_SIZE)
}

/// Size in bytes of a batch packet carrying `count` entries.
pub const fn batch_size(count: usize) -> usize {
    BATCH_HEADER_SIZE + BATCH_ENTRY_SIZE * count
}

// ── Owned-buffer convenience variants ─────────────────────────────────────────

/// Encodes a touch event into a fresh buffer.
pub fn encode_touch(event: &TouchEvent) -> Vec<u8> {
    let mut buf = [0u8; TOUCH_PACKET_SIZE];
    match encode_touch_into(event, &mut buf) {
        Ok(n) => buf[..n].to_vec(),
        Err(_) => Vec::new(),
    }
}

/// Encodes a key event into a fresh buffer.
pub fn encode_key(event: &KeyEvent) -> Vec<u8> {
    let mut buf = [0u8; KEY_PACKET_SIZE];
    match encode_key_into(event, &mut buf) {
        Ok(n) => buf[..n].to_vec(),
        Err(_) => Vec::new(),
    }
}

/// Encodes a batch into a fresh buffer.
///
/// # Errors
///
/// Returns [`CodecError::BatchTooLarge`] for more than 255 events.
pub fn encode_batch(events: &[TouchEvent]) -> Result<Vec<u8>, CodecError> {
    let mut buf = vec![0u8; batch_size(events.len().min(MAX_BATCH_ENTRIES + 1))];
    let n = encode_batch_into(events, &mut buf)?;
    buf.truncate(n);
    Ok(buf)
}

// ── Decoding (tooling and tests) ──────────────────────────────────────────────

/// Decodes one packet from the start of `bytes`.
///
/// Returns the packet and the number of bytes it occupied.
///
/// # Errors
///
/// Returns [`CodecError::UnknownTag`] or [`CodecError::InsufficientData`]
/// for malformed input.
pub fn decode_packet(bytes: &[u8]) -> Result<(Packet, usize), CodecError> {
    let Some(&tag_byte) = bytes.first() else {
        return Err(CodecError::InsufficientData { needed: 1, available: 0 });
    };
    let tag = PacketTag::try_from(tag_byte).map_err(|_| CodecError::UnknownTag(tag_byte))?;

    match tag {
        PacketTag::TouchDown | PacketTag::TouchUp | PacketTag::TouchMove => {
            require(bytes, TOUCH_PACKET_SIZE)?;
            let action = match tag {
                PacketTag::TouchDown => TouchAction::Down,
                PacketTag::TouchUp => TouchAction::Up,
                _ => TouchAction::Move,
            };
            let packet = Packet::Touch {
                seq: bytes[1],
                action,
                x: u16::from_be_bytes([bytes[2], bytes[3]]),
                y: u16::from_be_bytes([bytes[4], bytes[5]]),
            };
            Ok((packet, TOUCH_PACKET_SIZE))
        }
        PacketTag::TouchReset => Ok((Packet::TouchReset, TAG_ONLY_PACKET_SIZE)),
        PacketTag::Disconnect => Ok((Packet::Disconnect, TAG_ONLY_PACKET_SIZE)),
        PacketTag::KeyDown | PacketTag::KeyUp => {
            require(bytes, KEY_PACKET_SIZE)?;
            let action = if tag == PacketTag::KeyDown {
                KeyAction::Down
            } else {
                KeyAction::Up
            };
            let keycode = u16::from_be_bytes([bytes[1], bytes[2]]);
            Ok((Packet::Key(KeyEvent { action, keycode }), KEY_PACKET_SIZE))
        }
        PacketTag::TouchBatch => {
            require(bytes, BATCH_HEADER_SIZE)?;
            let count = bytes[1] as usize;
            let total = batch_size(count);
            require(bytes, total)?;
            let mut entries = Vec::with_capacity(count);
            for i in 0..count {
                let at = BATCH_HEADER_SIZE + i * BATCH_ENTRY_SIZE;
                let action = TouchAction::try_from(bytes[at + 1])
                    .map_err(|_| CodecError::UnknownAction(bytes[at + 1]))?;
                entries.push((
                    bytes[at],
                    action,
                    u16::from_be_bytes([bytes[at + 2], bytes[at + 3]]),
                    u16::from_be_bytes([bytes[at + 4], bytes[at + 5]]),
                ));
            }
            Ok((Packet::Batch(entries), total))
        }
    }
}

/// Decodes every packet in `bytes`.
///
/// # Errors
///
/// Propagates the first decoding error.
pub fn decode_all(mut bytes: &[u8]) -> Result<Vec<Packet>, CodecError> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let (packet, used) = decode_packet(bytes)?;
        out.push(packet);
        bytes = &bytes[used..];
    }
    Ok(out)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn ensure_capacity(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        return Err(CodecError::BufferTooSmall {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

fn require(bytes: &[u8], needed: usize) -> Result<(), CodecError> {
    if bytes.len() < needed {
        return Err(CodecError::InsufficientData {
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
