//! UA-TCP chunk header parsing and message framing.
//!
//! Every chunk on the wire starts with the same 12-byte prefix per OPC UA
//! Part 6 §6.7.2.2:
//! - 3 ASCII bytes message type (`OPN`, `CLO`, `MSG`)
//! - 1 ASCII byte chunk type (`F` final, `C` intermediate, `A` abort)
//! - u32 message size, header included
//! - u32 secure channel id
//!
//! All multi-byte integers are little-endian.

use crate::{Error, Result};

/// Wire bytes for an `OpenSecureChannel` chunk.
pub const MSG_OPEN_SECURE_CHANNEL: [u8; 3] = *b"OPN";
/// Wire bytes for a `CloseSecureChannel` chunk.
pub const MSG_CLOSE_SECURE_CHANNEL: [u8; 3] = *b"CLO";
/// Wire bytes for a symmetric secure-message chunk.
pub const MSG_SECURE_MESSAGE: [u8; 3] = *b"MSG";

/// Message types carried in the first three bytes of every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Asymmetric channel-establishment message (`OPN`).
    OpenSecureChannel,
    /// Channel teardown message (`CLO`).
    CloseSecureChannel,
    /// Symmetric traffic after establishment (`MSG`).
    SecureMessage,
}

impl MessageType {
    /// Parse from the 3-byte wire form.
    pub fn from_bytes(bytes: [u8; 3]) -> Result<Self> {
        match bytes {
            MSG_OPEN_SECURE_CHANNEL => Ok(Self::OpenSecureChannel),
            MSG_CLOSE_SECURE_CHANNEL => Ok(Self::CloseSecureChannel),
            MSG_SECURE_MESSAGE => Ok(Self::SecureMessage),
            other => Err(Error::MessageTypeInvalid(format!(
                "unknown message type {:?}",
                String::from_utf8_lossy(&other)
            ))),
        }
    }

    /// The 3-byte wire form.
    pub fn as_bytes(self) -> [u8; 3] {
        match self {
            Self::OpenSecureChannel => MSG_OPEN_SECURE_CHANNEL,
            Self::CloseSecureChannel => MSG_CLOSE_SECURE_CHANNEL,
            Self::SecureMessage => MSG_SECURE_MESSAGE,
        }
    }
}

/// Chunk continuation marker, the fourth byte of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// More chunks of this message follow (`C`).
    Intermediate,
    /// Last chunk of the message (`F`).
    Final,
    /// The sender abandoned the message; accumulated chunks are dropped (`A`).
    Abort,
}

impl ChunkType {
    /// Parse from the wire byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            b'C' => Ok(Self::Intermediate),
            b'F' => Ok(Self::Final),
            b'A' => Ok(Self::Abort),
            other => Err(Error::Decoding(format!("unknown chunk type 0x{other:02X}"))),
        }
    }

    /// The wire byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Intermediate => b'C',
            Self::Final => b'F',
            Self::Abort => b'A',
        }
    }
}

/// The fixed 12-byte prefix shared by every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Message type of the enclosing message.
    pub message_type: MessageType,
    /// Continuation marker for this chunk.
    pub chunk_type: ChunkType,
    /// Total chunk size in bytes, this header included.
    pub message_size: u32,
    /// Secure channel the chunk belongs to; 0 before a channel exists.
    pub secure_channel_id: u32,
}

impl ChunkHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 12;

    /// Parse the header from the front of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        check_len(data, Self::SIZE)?;

        let message_type = MessageType::from_bytes([data[0], data[1], data[2]])?;
        let chunk_type = ChunkType::from_byte(data[3])?;
        let message_size = read_u32_le(&data[4..8]);
        let secure_channel_id = read_u32_le(&data[8..12]);

        Ok(Self {
            message_type,
            chunk_type,
            message_size,
            secure_channel_id,
        })
    }

    /// Serialize the header into `buf`.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.message_type.as_bytes());
        buf.push(self.chunk_type.as_byte());
        buf.extend_from_slice(&self.message_size.to_le_bytes());
        buf.extend_from_slice(&self.secure_channel_id.to_le_bytes());
    }
}

/// One whole chunk sliced out of the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedChunk {
    /// The parsed 12-byte prefix.
    pub header: ChunkHeader,
    /// The complete chunk, header bytes included.
    pub data: Vec<u8>,
}

/// Slices whole chunks out of an incoming byte stream.
///
/// The framer never buffers partial chunks itself: the caller's input buffer
/// retains incomplete data, and [`Framer::poll`] returns `None` until a full
/// chunk is readable. Multi-chunk accumulation (abort handling, chunk-count
/// limits) belongs to the layer above.
#[derive(Debug, Clone)]
pub struct Framer {
    receive_buffer_size: usize,
}

impl Framer {
    /// Number of prefix bytes needed before the chunk size is known.
    pub const PREFIX_LEN: usize = 8;

    /// Create a framer that rejects chunks larger than `receive_buffer_size`.
    pub fn new(receive_buffer_size: usize) -> Self {
        Self {
            receive_buffer_size,
        }
    }

    /// Try to slice the next whole chunk off the front of `buf`.
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a complete chunk.
    /// On success the chunk's bytes are drained from `buf`.
    ///
    /// # Errors
    ///
    /// - [`Error::MessageTypeInvalid`] for an unknown 3-byte type
    /// - [`Error::MessageTooLarge`] when the declared size exceeds the
    ///   receive buffer, or is smaller than the header itself
    pub fn poll(&self, buf: &mut Vec<u8>) -> Result<Option<FramedChunk>> {
        if buf.len() < Self::PREFIX_LEN {
            return Ok(None);
        }

        // Validate the type eagerly so garbage input fails before the
        // declared size is trusted.
        MessageType::from_bytes([buf[0], buf[1], buf[2]])?;

        let message_size = read_u32_le(&buf[4..8]) as usize;
        if message_size > self.receive_buffer_size {
            return Err(Error::MessageTooLarge {
                actual: message_size,
                limit: self.receive_buffer_size,
            });
        }
        if message_size < ChunkHeader::SIZE {
            return Err(Error::Decoding(format!(
                "declared chunk size {message_size} below header size"
            )));
        }

        if buf.len() < message_size {
            return Ok(None);
        }

        let data: Vec<u8> = buf.drain(..message_size).collect();
        let header = ChunkHeader::parse(&data)?;

        Ok(Some(FramedChunk { header, data }))
    }
}

#[inline]
pub(crate) fn check_len(data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        Err(Error::Decoding(format!(
            "truncated input: need {needed} bytes, have {}",
            data.len()
        )))
    } else {
        Ok(())
    }
}

#[inline]
pub(crate) fn read_u32_le(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

#[inline]
pub(crate) fn read_i32_le(data: &[u8]) -> i32 {
    i32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

#[inline]
pub(crate) fn read_u64_le(data: &[u8]) -> u64 {
    u64::from_le_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ])
}
