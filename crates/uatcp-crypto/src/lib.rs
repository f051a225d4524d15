//! Cryptographic foundations of the uatcp secure-channel stack.
//!
//! Implements the algorithm suites OPC UA security policies require:
//! - policy definitions and algorithm selection (Part 7 §6.5)
//! - P_SHA1 / P_SHA256 symmetric key derivation (Part 6 §6.7.5)
//! - RSA envelope primitives for `OpenSecureChannel` (Part 6 §6.7.4)
//! - X.509 public-key extraction and SHA-1 thumbprints
//!
//! Derived key material is wrapped in `Zeroizing` and never logged.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod asymmetric;
pub mod error;
pub mod kdf;
pub mod nonce;
pub mod policy;

pub use error::{Error, Result};
pub use kdf::{derive_key_set, derive_secrets, KeySet, SecuritySecrets};
pub use nonce::generate_nonce;
pub use policy::SecurityPolicy;

// Re-exported so dependents name one rsa version.
pub use rsa::{RsaPrivateKey, RsaPublicKey};
