//! Length-prefixed framing and sync message payloads.
//!
//! # Wire Format
//!
//! Every frame on a transport connection is:
//! - length header: big-endian `u16` or `u32` (see [`LengthField`]), counting
//!   payload bytes only
//! - N bytes: payload
//!
//! Receivers delimit frames from the header alone and never scan payload
//! content.
//!
//! # Sync Payloads
//!
//! [`SyncMessage`] payloads are a 1-byte tag followed by the body:
//! - `0x01`: `Hello` (address)
//! - `0x02`: `Destroy` (primary)
//!
//! Strings are a big-endian `u16` byte length followed by UTF-8 bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use mastersync_core::Address;
use thiserror::Error;

/// Default maximum frame payload (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

const TAG_HELLO: u8 = 0x01;
const TAG_DESTROY: u8 = 0x02;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Actual size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Insufficient data to decode a frame or message.
    #[error("insufficient data: need {need} bytes, have {have}")]
    InsufficientData {
        /// Bytes needed.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// Unknown sync message tag.
    #[error("unknown message type: {tag}")]
    UnknownMessageType {
        /// The unknown tag value.
        tag: u8,
    },

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in {field}")]
    InvalidUtf8 {
        /// The field being decoded.
        field: &'static str,
    },

    /// A decoded address was rejected.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] mastersync_core::Error),

    /// Bytes remained after the message body.
    #[error("{remaining} trailing bytes after message")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Width of the frame length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthField {
    /// 2-byte header, frames up to 65535 bytes.
    U16,
    /// 4-byte header.
    #[default]
    U32,
}

impl LengthField {
    /// Returns the header width in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Returns the largest length the header can express.
    #[must_use]
    pub const fn max_length(self) -> usize {
        match self {
            Self::U16 => u16::MAX as usize,
            Self::U32 => u32::MAX as usize,
        }
    }
}

/// Length-prefixed frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    length_field: LengthField,
    max_frame_length: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(LengthField::U32, DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl FrameCodec {
    /// Creates a codec. The maximum is clamped to what the header can express.
    #[must_use]
    pub fn new(length_field: LengthField, max_frame_length: usize) -> Self {
        Self {
            length_field,
            max_frame_length: max_frame_length.min(length_field.max_length()),
        }
    }

    /// Returns the header width.
    #[must_use]
    pub const fn length_field(&self) -> LengthField {
        self.length_field
    }

    /// Returns the maximum payload length.
    #[must_use]
    pub const fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Appends a framed payload to `dst`.
    ///
    /// # Errors
    /// Returns an error if the payload exceeds the maximum frame length.
    pub fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> CodecResult<()> {
        if payload.len() > self.max_frame_length {
            return Err(CodecError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_length,
            });
        }

        let too_large = |_| CodecError::FrameTooLarge {
            size: payload.len(),
            max: self.max_frame_length,
        };

        dst.reserve(self.length_field.width() + payload.len());
        match self.length_field {
            LengthField::U16 => dst.put_u16(u16::try_from(payload.len()).map_err(too_large)?),
            LengthField::U32 => dst.put_u32(u32::try_from(payload.len()).map_err(too_large)?),
        }
        dst.put_slice(payload);
        Ok(())
    }

    /// Frames a payload into a fresh buffer.
    ///
    /// # Errors
    /// Returns an error if the payload exceeds the maximum frame length.
    pub fn encode_to_bytes(&self, payload: &[u8]) -> CodecResult<Bytes> {
        let mut buf = BytesMut::with_capacity(self.length_field.width() + payload.len());
        self.encode(payload, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes one frame from the front of `data`.
    ///
    /// Returns the payload and the number of bytes consumed, header included.
    ///
    /// # Errors
    /// Returns `InsufficientData` if the frame is incomplete, or `FrameTooLarge`
    /// if the header announces more than the maximum frame length.
    pub fn decode(&self, data: &[u8]) -> CodecResult<(Bytes, usize)> {
        let width = self.length_field.width();
        if data.len() < width {
            return Err(CodecError::InsufficientData {
                need: width,
                have: data.len(),
            });
        }

        let mut header = &data[..width];
        let len = match self.length_field {
            LengthField::U16 => usize::from(header.get_u16()),
            LengthField::U32 => header.get_u32() as usize,
        };

        if len > self.max_frame_length {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: self.max_frame_length,
            });
        }

        let total_len = width + len;
        if data.len() < total_len {
            return Err(CodecError::InsufficientData {
                need: total_len,
                have: data.len(),
            });
        }

        Ok((Bytes::copy_from_slice(&data[width..total_len]), total_len))
    }
}

/// Payloads exchanged on sync connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Greeting sent by a client right after connecting.
    Hello {
        /// The connecting node's address.
        address: Address,
    },
    /// Stand-down notice naming the newly elected primary.
    Destroy {
        /// The newly elected primary.
        primary: Address,
    },
}

impl SyncMessage {
    /// Encodes the message payload (without frame header).
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        match self {
            Self::Hello { address } => {
                buf.put_u8(TAG_HELLO);
                put_string(&mut buf, address.as_str());
            }
            Self::Destroy { primary } => {
                buf.put_u8(TAG_DESTROY);
                put_string(&mut buf, primary.as_str());
            }
        }
        buf.freeze()
    }

    /// Decodes a message payload.
    ///
    /// # Errors
    /// Returns an error if the payload is truncated, has an unknown tag, or
    /// carries an invalid address.
    pub fn decode(payload: &[u8]) -> CodecResult<Self> {
        let mut buf = payload;
        if buf.is_empty() {
            return Err(CodecError::InsufficientData { need: 1, have: 0 });
        }

        let message = match buf.get_u8() {
            TAG_HELLO => Self::Hello {
                address: Address::new(get_string(&mut buf, "hello.address")?)?,
            },
            TAG_DESTROY => Self::Destroy {
                primary: Address::new(get_string(&mut buf, "destroy.primary")?)?,
            },
            tag => return Err(CodecError::UnknownMessageType { tag }),
        };

        if !buf.is_empty() {
            return Err(CodecError::TrailingBytes {
                remaining: buf.len(),
            });
        }

        Ok(message)
    }
}

fn put_string(buf: &mut BytesMut, s: &str) {
    // Addresses are capped well below u16::MAX.
    #[allow(clippy::cast_possible_truncation)]
    let len = s.len() as u16;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
}

fn get_string(buf: &mut &[u8], field: &'static str) -> CodecResult<String> {
    if buf.remaining() < 2 {
        return Err(CodecError::InsufficientData {
            need: 2,
            have: buf.remaining(),
        });
    }
    let len = usize::from(buf.get_u16());
    if buf.remaining() < len {
        return Err(CodecError::InsufficientData {
            need: len,
            have: buf.remaining(),
        });
    }
    let (raw, rest) = buf.split_at(len);
    *buf = rest;
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8 { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn test_frame_header_is_big_endian_length() {
        let codec = FrameCodec::default();
        let frame = codec.encode_to_bytes(b"abc").unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 3, b'a', b'b', b'c']);

        let codec = FrameCodec::new(LengthField::U16, 1024);
        let frame = codec.encode_to_bytes(b"abc").unwrap();
        assert_eq!(&frame[..], &[0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_decode_partial_frames() {
        let codec = FrameCodec::default();
        let frame = codec.encode_to_bytes(b"hello").unwrap();

        for cut in 0..frame.len() {
            assert!(matches!(
                codec.decode(&frame[..cut]),
                Err(CodecError::InsufficientData { .. })
            ));
        }

        let (payload, consumed) = codec.decode(&frame).unwrap();
        assert_eq!(&payload[..], b"hello");
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(b"one", &mut buf).unwrap();
        codec.encode(b"", &mut buf).unwrap();
        codec.encode(b"three", &mut buf).unwrap();

        let mut payloads = Vec::new();
        while !buf.is_empty() {
            let (payload, consumed) = codec.decode(&buf).unwrap();
            payloads.push(payload);
            let _ = buf.split_to(consumed);
        }
        assert_eq!(payloads, vec![
            Bytes::from_static(b"one"),
            Bytes::new(),
            Bytes::from_static(b"three"),
        ]);
    }

    #[test]
    fn test_oversize_frames_rejected() {
        let codec = FrameCodec::new(LengthField::U32, 8);
        assert!(matches!(
            codec.encode_to_bytes(&[0u8; 9]),
            Err(CodecError::FrameTooLarge { size: 9, max: 8 })
        ));

        // A header announcing too much is rejected before the body arrives.
        let header = 1000u32.to_be_bytes();
        assert!(matches!(
            codec.decode(&header),
            Err(CodecError::FrameTooLarge { size: 1000, .. })
        ));
    }

    #[test]
    fn test_max_clamped_to_header() {
        let codec = FrameCodec::new(LengthField::U16, usize::MAX);
        assert_eq!(codec.max_frame_length(), 65535);
    }

    #[test]
    fn test_sync_message_layout() {
        let payload = SyncMessage::Destroy {
            primary: addr("h2"),
        }
        .encode();
        assert_eq!(&payload[..], &[TAG_DESTROY, 0, 2, b'h', b'2']);
        assert_eq!(
            SyncMessage::decode(&payload).unwrap(),
            SyncMessage::Destroy {
                primary: addr("h2")
            }
        );
    }

    #[test]
    fn test_sync_message_errors() {
        assert!(matches!(
            SyncMessage::decode(&[]),
            Err(CodecError::InsufficientData { .. })
        ));
        assert!(matches!(
            SyncMessage::decode(&[0x7f]),
            Err(CodecError::UnknownMessageType { tag: 0x7f })
        ));
        assert!(matches!(
            SyncMessage::decode(&[TAG_HELLO, 0, 5, b'a']),
            Err(CodecError::InsufficientData { .. })
        ));
        assert!(matches!(
            SyncMessage::decode(&[TAG_HELLO, 0, 0]),
            Err(CodecError::InvalidAddress(_))
        ));
        assert!(matches!(
            SyncMessage::decode(&[TAG_HELLO, 0, 1, b'a', b'z']),
            Err(CodecError::TrailingBytes { remaining: 1 })
        ));
        assert!(matches!(
            SyncMessage::decode(&[TAG_DESTROY, 0, 1, 0xff]),
            Err(CodecError::InvalidUtf8 { .. })
        ));
    }
}
