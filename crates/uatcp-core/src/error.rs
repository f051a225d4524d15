//! Error types for wire-level operations.

use crate::status::StatusCode;
use thiserror::Error;

/// Result type alias for wire-level operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while framing, decoding, or encoding UA-TCP messages.
///
/// Each variant maps onto the OPC UA status code the peer would observe;
/// see [`Error::status`].
#[derive(Debug, Error)]
pub enum Error {
    /// The 3-byte message type is unknown, or a known type arrived in a
    /// phase where it is not allowed.
    #[error("invalid message type: {0}")]
    MessageTypeInvalid(String),

    /// A chunk or message exceeded a negotiated limit.
    #[error("message too large: {actual} exceeds {limit}")]
    MessageTooLarge {
        /// Observed size or chunk count.
        actual: usize,
        /// The negotiated limit that was exceeded.
        limit: usize,
    },

    /// The secure channel id refers to no live channel.
    #[error("unknown secure channel id: {0}")]
    SecureChannelUnknown(u32),

    /// Signature, decryption, header-equality, or certificate checks failed.
    #[error("security checks failed: {0}")]
    SecurityChecksFailed(String),

    /// The peer certificate could not be parsed.
    #[error("certificate invalid: {0}")]
    CertificateInvalid(String),

    /// A structure on the wire is truncated or malformed.
    #[error("decoding failed: {0}")]
    Decoding(String),
}

impl Error {
    /// The OPC UA status code this error is reported as.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::MessageTypeInvalid(_) => StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
            Error::MessageTooLarge { .. } => StatusCode::BAD_TCP_MESSAGE_TOO_LARGE,
            Error::SecureChannelUnknown(_) => StatusCode::BAD_TCP_SECURE_CHANNEL_UNKNOWN,
            Error::SecurityChecksFailed(_) => StatusCode::BAD_SECURITY_CHECKS_FAILED,
            Error::CertificateInvalid(_) => StatusCode::BAD_CERTIFICATE_INVALID,
            Error::Decoding(_) => StatusCode::BAD_SECURITY_CHECKS_FAILED,
        }
    }
}
