use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header: one unsigned 64-bit payload length, big-endian.
pub const HEADER_SIZE: usize = 8;

/// Encode a payload length as a wire header.
pub fn encode_header(len: u64) -> [u8; HEADER_SIZE] {
    len.to_be_bytes()
}

/// Decode a wire header into the payload length it declares.
pub fn decode_header(buf: &[u8; HEADER_SIZE]) -> u64 {
    u64::from_be_bytes(*buf)
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────────────┬──────────────────┐
/// │ Length (8B BE u64) │ Payload          │
/// │                    │ (Length bytes)   │
/// └────────────────────┴──────────────────┘
/// ```
///
/// There is no magic number, version byte, or checksum; message boundaries
/// are defined solely by the length prefix. A zero-length payload produces a
/// header-only frame.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u64(payload.len() as u64);
    dst.put_slice(payload);
}

/// Decode one frame from a buffer.
///
/// Returns `None` if the buffer does not yet contain a complete frame. On
/// success, consumes the frame bytes and returns the payload (possibly
/// empty, for a header-only frame).
pub fn decode_frame(src: &mut BytesMut) -> Option<Bytes> {
    if src.len() < HEADER_SIZE {
        return None;
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&src[..HEADER_SIZE]);
    let payload_len = decode_header(&header);

    if (src.len() as u128) < HEADER_SIZE as u128 + payload_len as u128 {
        return None;
    }

    src.advance(HEADER_SIZE);
    Some(src.split_to(payload_len as usize).freeze())
}
