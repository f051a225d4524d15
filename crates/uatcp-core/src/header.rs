//! Security and sequence headers carried inside `OPN` chunks.
//!
//! Wire layout per OPC UA Part 6 §6.7.2.3/.4, little-endian:
//! - security policy URI: i32 length + UTF-8 bytes
//! - sender certificate: i32 length + DER bytes, or -1 for null
//! - receiver certificate thumbprint: i32 length + 20 SHA-1 bytes, or -1
//! - sequence header: u32 sequence number, u32 request id

use crate::chunk::{check_len, read_i32_le, read_u32_le};
use crate::{Error, Result};

/// Length of a SHA-1 certificate thumbprint in bytes.
pub const THUMBPRINT_LEN: usize = 20;

/// The asymmetric security header of an `OPN` chunk.
///
/// Field-wise equality is the identity of a handshake in progress: every
/// chunk after the first must carry a byte-equal header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsymmetricSecurityHeader {
    /// Security policy URI, e.g. `http://opcfoundation.org/UA/SecurityPolicy#None`.
    pub security_policy_uri: String,
    /// Sender's DER certificate; `None` when the policy needs no signing.
    pub sender_certificate: Option<Vec<u8>>,
    /// SHA-1 thumbprint of the receiver's certificate; `None` when the
    /// policy needs no encryption.
    pub receiver_certificate_thumbprint: Option<[u8; THUMBPRINT_LEN]>,
}

impl AsymmetricSecurityHeader {
    /// Parse the header from `data`, returning it plus the bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;

        check_len(data, offset + 4)?;
        let uri_len = read_i32_le(&data[offset..offset + 4]);
        offset += 4;
        if uri_len < 0 {
            return Err(Error::Decoding("security policy URI is null".into()));
        }
        let uri_len = uri_len as usize;

        check_len(data, offset + uri_len)?;
        let security_policy_uri = String::from_utf8(data[offset..offset + uri_len].to_vec())
            .map_err(|_| Error::Decoding("security policy URI is not UTF-8".into()))?;
        offset += uri_len;

        let (sender_certificate, consumed) = parse_byte_string(&data[offset..])?;
        offset += consumed;

        check_len(data, offset + 4)?;
        let thumb_len = read_i32_le(&data[offset..offset + 4]);
        offset += 4;
        let receiver_certificate_thumbprint = if thumb_len < 0 {
            None
        } else {
            if thumb_len as usize != THUMBPRINT_LEN {
                return Err(Error::Decoding(format!(
                    "thumbprint length {thumb_len}, expected {THUMBPRINT_LEN}"
                )));
            }
            check_len(data, offset + THUMBPRINT_LEN)?;
            let mut thumbprint = [0u8; THUMBPRINT_LEN];
            thumbprint.copy_from_slice(&data[offset..offset + THUMBPRINT_LEN]);
            offset += THUMBPRINT_LEN;
            Some(thumbprint)
        };

        Ok((
            Self {
                security_policy_uri,
                sender_certificate,
                receiver_certificate_thumbprint,
            },
            offset,
        ))
    }

    /// Serialize the header into `buf`.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.security_policy_uri.len() as i32).to_le_bytes());
        buf.extend_from_slice(self.security_policy_uri.as_bytes());

        serialize_byte_string(buf, self.sender_certificate.as_deref());
        serialize_byte_string(
            buf,
            self.receiver_certificate_thumbprint.as_ref().map(|t| &t[..]),
        );
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        let mut len = 4 + self.security_policy_uri.len() + 4 + 4;
        if let Some(cert) = &self.sender_certificate {
            len += cert.len();
        }
        if self.receiver_certificate_thumbprint.is_some() {
            len += THUMBPRINT_LEN;
        }
        len
    }
}

/// The sequence header preceding every chunk body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    /// Monotonically increasing per-channel chunk counter.
    pub sequence_number: u32,
    /// Request the chunk belongs to; constant across a message's chunks.
    pub request_id: u32,
}

impl SequenceHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 8;

    /// Parse the header from the front of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        check_len(data, Self::SIZE)?;
        Ok(Self {
            sequence_number: read_u32_le(&data[0..4]),
            request_id: read_u32_le(&data[4..8]),
        })
    }

    /// Serialize the header into `buf`.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.sequence_number.to_le_bytes());
        buf.extend_from_slice(&self.request_id.to_le_bytes());
    }
}

/// Parse an OPC UA ByteString: i32 length + bytes, -1 for null.
pub(crate) fn parse_byte_string(data: &[u8]) -> Result<(Option<Vec<u8>>, usize)> {
    check_len(data, 4)?;
    let len = read_i32_le(&data[0..4]);
    if len < 0 {
        return Ok((None, 4));
    }
    let len = len as usize;
    check_len(data, 4 + len)?;
    Ok((Some(data[4..4 + len].to_vec()), 4 + len))
}

/// Serialize an OPC UA ByteString: i32 length + bytes, -1 for null.
pub(crate) fn serialize_byte_string(buf: &mut Vec<u8>, value: Option<&[u8]>) {
    match value {
        Some(bytes) => {
            buf.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
        None => buf.extend_from_slice(&(-1i32).to_le_bytes()),
    }
}
