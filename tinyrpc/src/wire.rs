//! Wire format for request and response frames.
//!
//! Request frame: `[varint(header_len)][header_bytes][payload]`
//!
//! - **header_len**: length of the serialized header, as an unsigned LEB128 varint
//! - **header_bytes**: serialized [`Header`] naming the target service/method and
//!   carrying `args_size`, the exact byte length of the payload
//! - **payload**: `args_size` bytes of serialized request, no length prefix of its own
//!
//! Response frame: `[varint(len)][response_bytes]`. The response is length-prefixed
//! so that one response can be reassembled from any number of TCP reads.

use serde::{Deserialize, Serialize};

/// Maximum serialized header size (64KiB).
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Maximum payload size (1MB).
///
/// Frames larger than this are rejected to prevent memory exhaustion.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Wire format error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FrameError {
    /// The length varint ended before its final byte.
    #[error("truncated varint: {have} bytes available")]
    TruncatedVarint {
        /// Bytes available when the varint ran out.
        have: usize,
    },

    /// The length varint does not fit in 32 bits.
    #[error("varint overflow")]
    VarintOverflow,

    /// Not enough data to parse the frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required to parse.
        needed: usize,
        /// Actual bytes available.
        have: usize,
    },

    /// Header bytes could not be deserialized.
    #[error("header decode failed: {message}")]
    HeaderDecode {
        /// Details about the decode failure.
        message: String,
    },

    /// Header could not be serialized.
    #[error("header encode failed: {message}")]
    HeaderEncode {
        /// Details about the encode failure.
        message: String,
    },

    /// Header or payload exceeds its maximum allowed size.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The header's `args_size` does not match the payload length.
    #[error("args_size mismatch: header says {declared}, payload is {actual} bytes")]
    ArgsSizeMismatch {
        /// Length declared in the header.
        declared: u32,
        /// Actual payload length.
        actual: usize,
    },
}

/// Frame header identifying the target handler and the payload length.
///
/// Immutable once built; constructed per call and discarded after decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Name of the target service.
    pub service_name: String,
    /// Name of the target method within the service.
    pub method_name: String,
    /// Exact byte length of the request payload that follows the header.
    pub args_size: u32,
}

impl Header {
    /// Build a header for a payload of the given length.
    pub fn new(service_name: impl Into<String>, method_name: impl Into<String>, args_size: u32) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            args_size,
        }
    }
}

/// One decoded wire-level unit: header plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The decoded header.
    pub header: Header,
    /// Exactly `header.args_size` bytes of payload.
    pub payload: Vec<u8>,
}

/// Append `value` as an unsigned LEB128 varint.
pub fn write_varint(mut value: u32, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Read an unsigned LEB128 varint from the front of `buf`.
///
/// Returns `Ok(Some((value, consumed)))` on success and `Ok(None)` if the
/// buffer ends mid-varint (more data needed).
///
/// # Errors
///
/// Returns `VarintOverflow` if the encoding spans more than five bytes.
pub fn read_varint(buf: &[u8]) -> Result<Option<(u32, usize)>, FrameError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= 5 {
            return Err(FrameError::VarintOverflow);
        }
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Ok(None)
}

fn serialize_header(header: &Header) -> Result<Vec<u8>, FrameError> {
    serde_json::to_vec(header).map_err(|e| FrameError::HeaderEncode {
        message: e.to_string(),
    })
}

/// Encode a request frame from a header and payload.
///
/// # Errors
///
/// - `ArgsSizeMismatch` if `header.args_size` disagrees with the payload length
/// - `TooLarge` if the payload exceeds [`MAX_PAYLOAD_SIZE`]
pub fn encode_frame(header: &Header, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if header.args_size as usize != payload.len() {
        return Err(FrameError::ArgsSizeMismatch {
            declared: header.args_size,
            actual: payload.len(),
        });
    }
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let header_bytes = serialize_header(header)?;
    let mut out = Vec::with_capacity(5 + header_bytes.len() + payload.len());
    write_varint(header_bytes.len() as u32, &mut out);
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decode one complete request frame from `data`.
///
/// Returns the frame and the number of bytes consumed; trailing bytes belong
/// to the next frame.
///
/// # Errors
///
/// - `TruncatedVarint` / `InsufficientData` if the data ends mid-frame
/// - `HeaderDecode` if the header bytes are not a valid header
/// - `TooLarge` if the declared header or payload size exceeds its cap
pub fn decode_frame(data: &[u8]) -> Result<(Frame, usize), FrameError> {
    match parse_frame(data)? {
        Parsed::Complete(frame, consumed) => Ok((frame, consumed)),
        Parsed::NeedMore(Some(needed)) => Err(FrameError::InsufficientData {
            needed,
            have: data.len(),
        }),
        Parsed::NeedMore(None) => Err(FrameError::TruncatedVarint { have: data.len() }),
    }
}

/// Consume one complete request frame from the front of `buf`, if present.
///
/// TCP reads may deliver partial frames or several concatenated frames; this
/// leaves any trailing partial data in the buffer for the next read.
///
/// Returns `Ok(None)` when more data is needed (not an error condition).
pub fn try_decode_frame(buf: &mut Vec<u8>) -> Result<Option<Frame>, FrameError> {
    match parse_frame(buf)? {
        Parsed::Complete(frame, consumed) => {
            buf.drain(..consumed);
            Ok(Some(frame))
        }
        Parsed::NeedMore(_) => Ok(None),
    }
}

enum Parsed {
    Complete(Frame, usize),
    /// Not enough data; `Some(n)` if the total size is already known.
    NeedMore(Option<usize>),
}

fn parse_frame(data: &[u8]) -> Result<Parsed, FrameError> {
    let Some((header_len, varint_len)) = read_varint(data)? else {
        return Ok(Parsed::NeedMore(None));
    };
    let header_len = header_len as usize;
    if header_len > MAX_HEADER_SIZE {
        return Err(FrameError::TooLarge {
            size: header_len,
            max: MAX_HEADER_SIZE,
        });
    }
    if data.len() < varint_len + header_len {
        return Ok(Parsed::NeedMore(Some(varint_len + header_len)));
    }

    let header_bytes = &data[varint_len..varint_len + header_len];
    let header: Header =
        serde_json::from_slice(header_bytes).map_err(|e| FrameError::HeaderDecode {
            message: e.to_string(),
        })?;

    let args_size = header.args_size as usize;
    if args_size > MAX_PAYLOAD_SIZE {
        return Err(FrameError::TooLarge {
            size: args_size,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let total = varint_len + header_len + args_size;
    if data.len() < total {
        return Ok(Parsed::NeedMore(Some(total)));
    }

    let payload = data[varint_len + header_len..total].to_vec();
    Ok(Parsed::Complete(Frame { header, payload }, total))
}

/// Encode a response frame: `varint(len) || response_bytes`.
///
/// # Errors
///
/// Returns `TooLarge` if the response exceeds [`MAX_PAYLOAD_SIZE`].
pub fn encode_response(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let mut out = Vec::with_capacity(5 + payload.len());
    write_varint(payload.len() as u32, &mut out);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Consume one complete response frame from the front of `buf`, if present.
///
/// Returns `Ok(None)` when more data is needed.
pub fn try_decode_response(buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>, FrameError> {
    let Some((len, varint_len)) = read_varint(buf)? else {
        return Ok(None);
    };
    let len = len as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::TooLarge {
            size: len,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let total = varint_len + len;
    if buf.len() < total {
        return Ok(None);
    }
    let payload = buf[varint_len..total].to_vec();
    buf.drain(..total);
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(payload: &[u8]) -> Header {
        Header::new("UserService", "Login", payload.len() as u32)
    }

    #[test]
    fn test_varint_roundtrip() {
        for value in [0u32, 1, 127, 128, 300, 16_383, 16_384, u32::MAX] {
            let mut buf = Vec::new();
            write_varint(value, &mut buf);
            let (decoded, consumed) = read_varint(&buf).expect("decode").expect("complete");
            assert_eq!(decoded, value);
            assert_eq!(consumed, buf.len());
        }
    }

    #[test]
    fn test_varint_single_byte_boundary() {
        let mut buf = Vec::new();
        write_varint(127, &mut buf);
        assert_eq!(buf, vec![0x7f]);

        buf.clear();
        write_varint(128, &mut buf);
        assert_eq!(buf, vec![0x80, 0x01]);
    }

    #[test]
    fn test_varint_partial_returns_none() {
        // Continuation bit set on every byte, then the buffer ends
        let result = read_varint(&[0x80, 0x80]).expect("not an error");
        assert!(result.is_none());
    }

    #[test]
    fn test_varint_overflow() {
        let result = read_varint(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert!(matches!(result, Err(FrameError::VarintOverflow)));
    }

    #[test]
    fn test_frame_roundtrip() {
        let payload = b"HelloWorld!";
        let header = sample_header(payload);

        let encoded = encode_frame(&header, payload).expect("encode");
        let (frame, consumed) = decode_frame(&encoded).expect("decode");

        assert_eq!(frame.header, header);
        assert_eq!(frame.payload, payload);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_frame_empty_payload() {
        let header = Header::new("S", "M", 0);
        let encoded = encode_frame(&header, &[]).expect("encode");
        let (frame, _) = decode_frame(&encoded).expect("decode");
        assert_eq!(frame.header.args_size, 0);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_frame_args_size_mismatch() {
        let header = Header::new("S", "M", 5);
        let result = encode_frame(&header, b"four");
        assert!(matches!(
            result,
            Err(FrameError::ArgsSizeMismatch {
                declared: 5,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_frame_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let header = sample_header(&payload);
        let result = encode_frame(&header, &payload);
        assert!(matches!(result, Err(FrameError::TooLarge { .. })));
    }

    #[test]
    fn test_decode_truncated_varint() {
        let result = decode_frame(&[0x80]);
        assert!(matches!(result, Err(FrameError::TruncatedVarint { have: 1 })));
    }

    #[test]
    fn test_decode_truncated_header() {
        let header = sample_header(b"payload");
        let encoded = encode_frame(&header, b"payload").expect("encode");

        let result = decode_frame(&encoded[..3]);
        assert!(matches!(result, Err(FrameError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let header = sample_header(b"payload");
        let encoded = encode_frame(&header, b"payload").expect("encode");

        let result = decode_frame(&encoded[..encoded.len() - 2]);
        assert!(matches!(result, Err(FrameError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_garbage_header() {
        let mut data = Vec::new();
        write_varint(4, &mut data);
        data.extend_from_slice(b"}{!["); // declared header bytes, not valid
        let result = decode_frame(&data);
        assert!(matches!(result, Err(FrameError::HeaderDecode { .. })));
    }

    #[test]
    fn test_try_decode_incremental() {
        let payload = b"incremental delivery";
        let header = sample_header(payload);
        let encoded = encode_frame(&header, payload).expect("encode");

        // Feed one byte at a time; the frame must appear exactly once,
        // after the final byte arrives.
        let mut buf = Vec::new();
        for (i, byte) in encoded.iter().enumerate() {
            buf.push(*byte);
            let result = try_decode_frame(&mut buf).expect("no error");
            if i + 1 < encoded.len() {
                assert!(result.is_none(), "frame complete too early at byte {}", i);
            } else {
                let frame = result.expect("complete frame");
                assert_eq!(frame.payload, payload);
                assert!(buf.is_empty());
            }
        }
    }

    #[test]
    fn test_try_decode_concatenated_frames() {
        let first = encode_frame(&sample_header(b"one"), b"one").expect("encode");
        let second = encode_frame(&Header::new("Echo", "Echo", 3), b"two").expect("encode");

        let mut buf = Vec::new();
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second);

        let f1 = try_decode_frame(&mut buf).expect("ok").expect("frame");
        assert_eq!(f1.payload, b"one");
        let f2 = try_decode_frame(&mut buf).expect("ok").expect("frame");
        assert_eq!(f2.header.service_name, "Echo");
        assert_eq!(f2.payload, b"two");
        assert!(try_decode_frame(&mut buf).expect("ok").is_none());
    }

    #[test]
    fn test_try_decode_leaves_trailing_partial() {
        let first = encode_frame(&sample_header(b"full"), b"full").expect("encode");
        let second = encode_frame(&sample_header(b"cut"), b"cut").expect("encode");

        let mut buf = Vec::new();
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second[..second.len() / 2]);

        let f1 = try_decode_frame(&mut buf).expect("ok").expect("frame");
        assert_eq!(f1.payload, b"full");
        assert!(try_decode_frame(&mut buf).expect("ok").is_none());
        assert_eq!(buf.len(), second.len() / 2);
    }

    #[test]
    fn test_response_roundtrip() {
        let encoded = encode_response(b"response body").expect("encode");
        let mut buf = encoded;
        let decoded = try_decode_response(&mut buf).expect("ok").expect("complete");
        assert_eq!(decoded, b"response body");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_response_partial_then_complete() {
        let encoded = encode_response(b"split across reads").expect("encode");

        let mut buf = encoded[..4].to_vec();
        assert!(try_decode_response(&mut buf).expect("ok").is_none());

        buf.extend_from_slice(&encoded[4..]);
        let decoded = try_decode_response(&mut buf).expect("ok").expect("complete");
        assert_eq!(decoded, b"split across reads");
    }

    #[test]
    fn test_response_too_large() {
        let mut buf = Vec::new();
        write_varint((MAX_PAYLOAD_SIZE + 1) as u32, &mut buf);
        let result = try_decode_response(&mut buf);
        assert!(matches!(result, Err(FrameError::TooLarge { .. })));
    }
}
