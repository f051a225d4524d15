//! `OpenSecureChannel` service messages and their binary codecs.
//!
//! Message bodies start with the four-byte numeric NodeId of the structure's
//! binary encoding (OPC UA Part 6 §5.2.2.9), which is what the
//! [`CodecRegistry`] dispatches on. The registry is built explicitly at
//! startup and handed to whoever decodes; there is no process-global codec
//! table.

use crate::chunk::{check_len, read_u32_le, read_u64_le};
use crate::header::{parse_byte_string, serialize_byte_string};
use crate::status::StatusCode;
use crate::{Error, Result};
use std::collections::HashMap;

/// Numeric NodeId of `OpenSecureChannelRequest_Encoding_DefaultBinary`.
pub const OPEN_SECURE_CHANNEL_REQUEST_ID: u32 = 446;
/// Numeric NodeId of `OpenSecureChannelResponse_Encoding_DefaultBinary`.
pub const OPEN_SECURE_CHANNEL_RESPONSE_ID: u32 = 449;

/// 100-nanosecond ticks between 1601-01-01 and 1970-01-01.
const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

/// OPC UA DateTime: 100 ns ticks since 1601-01-01 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateTime(pub i64);

impl DateTime {
    /// The current wall-clock time.
    pub fn now() -> Self {
        let since_unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self(UNIX_EPOCH_TICKS + (since_unix.as_nanos() / 100) as i64)
    }
}

/// Whether an `OpenSecureChannel` issues a new token or renews one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityTokenRequestType {
    /// First token on a channel.
    Issue,
    /// Replacement token on an established channel.
    Renew,
}

impl SecurityTokenRequestType {
    /// Parse from the wire value.
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Issue),
            1 => Ok(Self::Renew),
            other => Err(Error::Decoding(format!(
                "unknown SecurityTokenRequestType {other}"
            ))),
        }
    }

    /// The wire value.
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Issue => 0,
            Self::Renew => 1,
        }
    }
}

/// Protection applied to symmetric traffic on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSecurityMode {
    /// No signing, no encryption.
    None,
    /// Signed only.
    Sign,
    /// Signed and encrypted.
    SignAndEncrypt,
}

impl MessageSecurityMode {
    /// Parse from the wire value. Zero is the spec's `Invalid` and rejected.
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::None),
            2 => Ok(Self::Sign),
            3 => Ok(Self::SignAndEncrypt),
            other => Err(Error::Decoding(format!(
                "unknown MessageSecurityMode {other}"
            ))),
        }
    }

    /// The wire value.
    pub fn to_u32(self) -> u32 {
        match self {
            Self::None => 1,
            Self::Sign => 2,
            Self::SignAndEncrypt => 3,
        }
    }
}

/// Common request fields consumed by this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    /// Client's send time.
    pub timestamp: DateTime,
    /// Client-chosen handle, echoed in the response.
    pub request_handle: u32,
    /// Diagnostics mask; passed through untouched.
    pub return_diagnostics: u32,
    /// Client timeout hint in milliseconds.
    pub timeout_hint: u32,
}

/// Common response fields produced by this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Server's send time.
    pub timestamp: DateTime,
    /// The request's handle, echoed.
    pub request_handle: u32,
    /// Service-level result.
    pub service_result: StatusCode,
}

/// One key epoch on a secure channel, identified by `(channel_id, token_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSecurityToken {
    /// The channel the token belongs to.
    pub channel_id: u32,
    /// Server-wide monotonic token id.
    pub token_id: u32,
    /// Server time the token was minted.
    pub created_at: DateTime,
    /// Lifetime granted by the server, in milliseconds.
    pub revised_lifetime: u32,
}

/// The request that opens or renews a secure channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSecureChannelRequest {
    /// Common request fields.
    pub request_header: RequestHeader,
    /// Client's UA-TCP protocol version.
    pub client_protocol_version: u32,
    /// Issue or Renew.
    pub request_type: SecurityTokenRequestType,
    /// Requested protection for symmetric traffic.
    pub security_mode: MessageSecurityMode,
    /// Client's key-derivation nonce; empty when the policy is None.
    pub client_nonce: Vec<u8>,
    /// Requested token lifetime in ms; the server revises it.
    pub requested_lifetime: u32,
}

/// The response carrying the minted token and server nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSecureChannelResponse {
    /// Common response fields.
    pub response_header: ResponseHeader,
    /// Server's UA-TCP protocol version.
    pub server_protocol_version: u32,
    /// The issued or renewed token.
    pub security_token: ChannelSecurityToken,
    /// Server's key-derivation nonce; empty when the policy is None.
    pub server_nonce: Vec<u8>,
}

/// A decoded service message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `OpenSecureChannelRequest`.
    OpenSecureChannelRequest(OpenSecureChannelRequest),
    /// `OpenSecureChannelResponse`.
    OpenSecureChannelResponse(OpenSecureChannelResponse),
}

impl Message {
    /// The numeric NodeId of this message's binary encoding.
    pub fn type_id(&self) -> u32 {
        match self {
            Message::OpenSecureChannelRequest(_) => OPEN_SECURE_CHANNEL_REQUEST_ID,
            Message::OpenSecureChannelResponse(_) => OPEN_SECURE_CHANNEL_RESPONSE_ID,
        }
    }
}

/// Encoder/decoder for one message type.
pub trait BinaryCodec: Send + Sync {
    /// The numeric NodeId this codec handles.
    fn type_id(&self) -> u32;

    /// Decode the message body (NodeId prefix already consumed).
    fn decode(&self, body: &[u8]) -> Result<Message>;

    /// Encode the message body (NodeId prefix written by the registry).
    fn encode(&self, message: &Message, buf: &mut Vec<u8>) -> Result<()>;
}

/// Explicit codec table, constructed at startup and threaded into the
/// decoding path as a dependency.
pub struct CodecRegistry {
    codecs: HashMap<u32, Box<dyn BinaryCodec>>,
}

impl CodecRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// A registry with the `OpenSecureChannel` request/response codecs.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(OpenSecureChannelRequestCodec));
        registry.register(Box::new(OpenSecureChannelResponseCodec));
        registry
    }

    /// Register a codec, replacing any previous one for the same type id.
    pub fn register(&mut self, codec: Box<dyn BinaryCodec>) {
        self.codecs.insert(codec.type_id(), codec);
    }

    /// Decode a full message body: four-byte NodeId prefix, then the
    /// structure fields.
    pub fn decode_message(&self, data: &[u8]) -> Result<Message> {
        let (type_id, consumed) = parse_node_id(data)?;
        let codec = self
            .codecs
            .get(&type_id)
            .ok_or_else(|| Error::Decoding(format!("no codec registered for type {type_id}")))?;
        codec.decode(&data[consumed..])
    }

    /// Encode a message with its NodeId prefix into `buf`.
    pub fn encode_message(&self, message: &Message, buf: &mut Vec<u8>) -> Result<()> {
        let type_id = message.type_id();
        let codec = self
            .codecs
            .get(&type_id)
            .ok_or_else(|| Error::Decoding(format!("no codec registered for type {type_id}")))?;
        serialize_node_id(buf, type_id);
        codec.encode(message, buf)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Parse a four-byte numeric NodeId (encoding byte 0x01, namespace 0, u16 id).
fn parse_node_id(data: &[u8]) -> Result<(u32, usize)> {
    check_len(data, 4)?;
    if data[0] != 0x01 || data[1] != 0x00 {
        return Err(Error::Decoding(format!(
            "unsupported NodeId encoding 0x{:02X} ns {}",
            data[0], data[1]
        )));
    }
    let id = u16::from_le_bytes([data[2], data[3]]) as u32;
    Ok((id, 4))
}

fn serialize_node_id(buf: &mut Vec<u8>, type_id: u32) {
    buf.push(0x01);
    buf.push(0x00);
    buf.extend_from_slice(&(type_id as u16).to_le_bytes());
}

/// Codec for [`OpenSecureChannelRequest`].
pub struct OpenSecureChannelRequestCodec;

impl BinaryCodec for OpenSecureChannelRequestCodec {
    fn type_id(&self) -> u32 {
        OPEN_SECURE_CHANNEL_REQUEST_ID
    }

    fn decode(&self, body: &[u8]) -> Result<Message> {
        let mut offset = 0;

        check_len(body, offset + 20)?;
        let timestamp = DateTime(read_u64_le(&body[offset..offset + 8]) as i64);
        let request_handle = read_u32_le(&body[offset + 8..offset + 12]);
        let return_diagnostics = read_u32_le(&body[offset + 12..offset + 16]);
        let timeout_hint = read_u32_le(&body[offset + 16..offset + 20]);
        offset += 20;

        check_len(body, offset + 12)?;
        let client_protocol_version = read_u32_le(&body[offset..offset + 4]);
        let request_type =
            SecurityTokenRequestType::from_u32(read_u32_le(&body[offset + 4..offset + 8]))?;
        let security_mode =
            MessageSecurityMode::from_u32(read_u32_le(&body[offset + 8..offset + 12]))?;
        offset += 12;

        let (client_nonce, consumed) = parse_byte_string(&body[offset..])?;
        offset += consumed;

        check_len(body, offset + 4)?;
        let requested_lifetime = read_u32_le(&body[offset..offset + 4]);

        Ok(Message::OpenSecureChannelRequest(OpenSecureChannelRequest {
            request_header: RequestHeader {
                timestamp,
                request_handle,
                return_diagnostics,
                timeout_hint,
            },
            client_protocol_version,
            request_type,
            security_mode,
            client_nonce: client_nonce.unwrap_or_default(),
            requested_lifetime,
        }))
    }

    fn encode(&self, message: &Message, buf: &mut Vec<u8>) -> Result<()> {
        let Message::OpenSecureChannelRequest(request) = message else {
            return Err(Error::Decoding("wrong message type for codec".into()));
        };

        buf.extend_from_slice(&request.request_header.timestamp.0.to_le_bytes());
        buf.extend_from_slice(&request.request_header.request_handle.to_le_bytes());
        buf.extend_from_slice(&request.request_header.return_diagnostics.to_le_bytes());
        buf.extend_from_slice(&request.request_header.timeout_hint.to_le_bytes());

        buf.extend_from_slice(&request.client_protocol_version.to_le_bytes());
        buf.extend_from_slice(&request.request_type.to_u32().to_le_bytes());
        buf.extend_from_slice(&request.security_mode.to_u32().to_le_bytes());

        let nonce = (!request.client_nonce.is_empty()).then_some(&request.client_nonce[..]);
        serialize_byte_string(buf, nonce);

        buf.extend_from_slice(&request.requested_lifetime.to_le_bytes());
        Ok(())
    }
}

/// Codec for [`OpenSecureChannelResponse`].
pub struct OpenSecureChannelResponseCodec;

impl BinaryCodec for OpenSecureChannelResponseCodec {
    fn type_id(&self) -> u32 {
        OPEN_SECURE_CHANNEL_RESPONSE_ID
    }

    fn decode(&self, body: &[u8]) -> Result<Message> {
        let mut offset = 0;

        check_len(body, offset + 16)?;
        let timestamp = DateTime(read_u64_le(&body[offset..offset + 8]) as i64);
        let request_handle = read_u32_le(&body[offset + 8..offset + 12]);
        let service_result = StatusCode(read_u32_le(&body[offset + 12..offset + 16]));
        offset += 16;

        check_len(body, offset + 4)?;
        let server_protocol_version = read_u32_le(&body[offset..offset + 4]);
        offset += 4;

        check_len(body, offset + 20)?;
        let security_token = ChannelSecurityToken {
            channel_id: read_u32_le(&body[offset..offset + 4]),
            token_id: read_u32_le(&body[offset + 4..offset + 8]),
            created_at: DateTime(read_u64_le(&body[offset + 8..offset + 16]) as i64),
            revised_lifetime: read_u32_le(&body[offset + 16..offset + 20]),
        };
        offset += 20;

        let (server_nonce, _) = parse_byte_string(&body[offset..])?;

        Ok(Message::OpenSecureChannelResponse(
            OpenSecureChannelResponse {
                response_header: ResponseHeader {
                    timestamp,
                    request_handle,
                    service_result,
                },
                server_protocol_version,
                security_token,
                server_nonce: server_nonce.unwrap_or_default(),
            },
        ))
    }

    fn encode(&self, message: &Message, buf: &mut Vec<u8>) -> Result<()> {
        let Message::OpenSecureChannelResponse(response) = message else {
            return Err(Error::Decoding("wrong message type for codec".into()));
        };

        buf.extend_from_slice(&response.response_header.timestamp.0.to_le_bytes());
        buf.extend_from_slice(&response.response_header.request_handle.to_le_bytes());
        buf.extend_from_slice(&response.response_header.service_result.0.to_le_bytes());

        buf.extend_from_slice(&response.server_protocol_version.to_le_bytes());

        buf.extend_from_slice(&response.security_token.channel_id.to_le_bytes());
        buf.extend_from_slice(&response.security_token.token_id.to_le_bytes());
        buf.extend_from_slice(&response.security_token.created_at.0.to_le_bytes());
        buf.extend_from_slice(&response.security_token.revised_lifetime.to_le_bytes());

        let nonce = (!response.server_nonce.is_empty()).then_some(&response.server_nonce[..]);
        serialize_byte_string(buf, nonce);
        Ok(())
    }
}
