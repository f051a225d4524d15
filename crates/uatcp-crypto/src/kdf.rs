//! Symmetric key derivation via P_SHA1 / P_SHA256.
//!
//! OPC UA Part 6 §6.7.5 derives each direction's key set with the TLS-style
//! P_hash expansion:
//!
//! ```text
//! A(0) = seed
//! A(i) = HMAC(secret, A(i-1))
//! P_hash(secret, seed) = HMAC(secret, A(1) || seed) ||
//!                        HMAC(secret, A(2) || seed) || ...
//! ```
//!
//! The expansion is sliced into signature key, encryption key, and IV, in
//! that order, with lengths fixed by the security policy. Derivation is pure:
//! same policy and nonces, same keys, on every invocation.

use crate::policy::{KeyDerivationHash, SecurityPolicy};
use hmac::digest::core_api::BlockSizeUser;
use hmac::digest::Digest;
use hmac::{Mac, SimpleHmac};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

/// One direction's derived key material.
#[derive(Clone)]
pub struct SecuritySecrets {
    /// HMAC key for symmetric message signatures.
    pub signature_key: Zeroizing<Vec<u8>>,
    /// AES key for symmetric message encryption.
    pub encryption_key: Zeroizing<Vec<u8>>,
    /// AES-CBC initialization vector.
    pub initialization_vector: Zeroizing<Vec<u8>>,
}

impl PartialEq for SecuritySecrets {
    fn eq(&self, other: &Self) -> bool {
        *self.signature_key == *other.signature_key
            && *self.encryption_key == *other.encryption_key
            && *self.initialization_vector == *other.initialization_vector
    }
}

impl Eq for SecuritySecrets {}

// Key material never reaches logs; Debug prints lengths only.
impl core::fmt::Debug for SecuritySecrets {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecuritySecrets")
            .field("signature_key", &format_args!("[{} bytes]", self.signature_key.len()))
            .field("encryption_key", &format_args!("[{} bytes]", self.encryption_key.len()))
            .field(
                "initialization_vector",
                &format_args!("[{} bytes]", self.initialization_vector.len()),
            )
            .finish()
    }
}

/// Both directions' key material for one token epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    /// Keys the client uses to protect traffic (server verifies/decrypts).
    pub client: SecuritySecrets,
    /// Keys the server uses to protect traffic (client verifies/decrypts).
    pub server: SecuritySecrets,
}

/// P_SHA1 expansion of `secret`/`seed` to `output_len` bytes.
pub fn p_sha1(secret: &[u8], seed: &[u8], output_len: usize) -> Zeroizing<Vec<u8>> {
    p_hash::<Sha1>(secret, seed, output_len)
}

/// P_SHA256 expansion of `secret`/`seed` to `output_len` bytes.
pub fn p_sha256(secret: &[u8], seed: &[u8], output_len: usize) -> Zeroizing<Vec<u8>> {
    p_hash::<Sha256>(secret, seed, output_len)
}

fn p_hash<D>(secret: &[u8], seed: &[u8], output_len: usize) -> Zeroizing<Vec<u8>>
where
    D: Digest + BlockSizeUser + Clone,
{
    let mut output = Zeroizing::new(Vec::with_capacity(output_len));

    // A(1)
    let mut a = hmac_once::<D>(secret, &[seed]);

    while output.len() < output_len {
        let block = hmac_once::<D>(secret, &[&a, seed]);
        let take = usize::min(block.len(), output_len - output.len());
        output.extend_from_slice(&block[..take]);

        // A(i+1)
        a = hmac_once::<D>(secret, &[&a]);
    }

    output
}

fn hmac_once<D>(secret: &[u8], parts: &[&[u8]]) -> Zeroizing<Vec<u8>>
where
    D: Digest + BlockSizeUser + Clone,
{
    let mut mac =
        SimpleHmac::<D>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    Zeroizing::new(mac.finalize().into_bytes().to_vec())
}

/// Derive one direction's secrets from an ordered nonce pair.
///
/// The caller's nonce ordering selects the direction; see [`derive_key_set`].
/// Deterministic, no I/O.
pub fn derive_secrets(policy: SecurityPolicy, secret: &[u8], seed: &[u8]) -> SecuritySecrets {
    let signature_len = policy.symmetric_signature_key_len();
    let encryption_len = policy.symmetric_encryption_key_len();
    let iv_len = policy.symmetric_iv_len();
    let total = signature_len + encryption_len + iv_len;

    let expanded = match policy.key_derivation_hash() {
        KeyDerivationHash::Sha1 => p_sha1(secret, seed, total),
        KeyDerivationHash::Sha256 => p_sha256(secret, seed, total),
    };

    SecuritySecrets {
        signature_key: Zeroizing::new(expanded[..signature_len].to_vec()),
        encryption_key: Zeroizing::new(expanded[signature_len..signature_len + encryption_len].to_vec()),
        initialization_vector: Zeroizing::new(expanded[signature_len + encryption_len..].to_vec()),
    }
}

/// Derive the full key set for a token epoch.
///
/// Per OPC UA Part 6 Table 60: the client's keys expand
/// `(secret = server_nonce, seed = client_nonce)`, the server's keys the
/// swapped pair.
pub fn derive_key_set(
    policy: SecurityPolicy,
    client_nonce: &[u8],
    server_nonce: &[u8],
) -> KeySet {
    KeySet {
        client: derive_secrets(policy, server_nonce, client_nonce),
        server: derive_secrets(policy, client_nonce, server_nonce),
    }
}
