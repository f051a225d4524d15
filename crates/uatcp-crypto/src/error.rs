//! Error types for cryptographic operations.

use thiserror::Error;

/// Result type alias for cryptographic operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The security policy URI is not one of the supported policies.
    #[error("unsupported security policy: {0}")]
    UnsupportedPolicy(String),

    /// A certificate could not be parsed or carries an unusable key.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// RSA encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// RSA decryption failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Signature creation failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Signature verification failed.
    #[error("signature verification failed")]
    BadSignature,

    /// Unsupported operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Input length does not match what the operation requires.
    #[error("invalid input length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length received in bytes.
        actual: usize,
    },
}
