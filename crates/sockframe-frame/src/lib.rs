//! Length-prefixed message framing over byte streams.
//!
//! Every message is framed with an 8-byte big-endian payload length,
//! followed by exactly that many payload bytes. A declared length of zero is
//! a valid header-only frame; it occupies the wire but never delivers a
//! message to a reader.
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, decode_header, encode_frame, encode_header, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
