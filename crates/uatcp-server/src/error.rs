//! Server-side errors.

use thiserror::Error;
use uatcp_core::StatusCode;

/// Result type alias for server operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while establishing or maintaining secure channels.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire-level framing or decoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] uatcp_core::Error),

    /// Cryptographic failure in the asymmetric envelope or key derivation.
    #[error("crypto error: {0}")]
    Crypto(#[from] uatcp_crypto::Error),

    /// Transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The OPC UA status code this error is reported as.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Protocol(e) => e.status(),
            Error::Crypto(uatcp_crypto::Error::InvalidCertificate(_)) => {
                StatusCode::BAD_CERTIFICATE_INVALID
            }
            Error::Crypto(_) => StatusCode::BAD_SECURITY_CHECKS_FAILED,
            Error::Io(_) => StatusCode::BAD_INTERNAL_ERROR,
        }
    }
}
