//! Wire protocol: packet types, the fixed-layout codec and the touch-sequence generator.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_all, decode_packet, to_wire, CodecError};
pub use messages::*;
pub use sequence::TouchSequence;
