//! A sink that only logs what it is given.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use keytouch_core::protocol::PacketTag;
use tracing::debug;

use crate::application::output::ControlSink;

/// Accepts every packet and logs it as hex at `debug`.
#[derive(Debug, Default)]
pub struct LoggingSink {
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl ControlSink for LoggingSink {
    fn send(&self, bytes: &[u8]) -> i64 {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        let tag = bytes.first().and_then(|&b| PacketTag::try_from(b).ok());
        debug!(?tag, len = bytes.len(), hex = %hex(bytes), "control packet");
        bytes.len() as i64
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
    out
}
