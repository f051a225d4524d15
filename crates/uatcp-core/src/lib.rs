//! Wire-level core of the uatcp secure-channel stack.
//!
//! This crate implements the UA-TCP binary layer per OPC UA Part 6:
//! - chunk headers and message framing (§6.7.2.2)
//! - asymmetric security and sequence headers (§6.7.2.3/.4)
//! - `OpenSecureChannel` request/response structures and binary codecs
//! - typed status codes for transport-level errors
//!
//! No I/O and no cryptography live here; uatcp-crypto and uatcp-server
//! build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chunk;
pub mod error;
pub mod header;
pub mod messages;
pub mod status;

pub use chunk::{ChunkHeader, ChunkType, FramedChunk, Framer, MessageType};
pub use error::{Error, Result};
pub use header::{AsymmetricSecurityHeader, SequenceHeader};
pub use messages::{CodecRegistry, Message};
pub use status::StatusCode;
