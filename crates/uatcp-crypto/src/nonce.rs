//! Nonce generation for key derivation.

use rand::rngs::OsRng;
use rand::RngCore;

/// Generate a cryptographically random nonce of the given length.
///
/// The length comes from the security policy's symmetric key size; a zero
/// length (policy None) yields an empty nonce.
pub fn generate_nonce(len: usize) -> Vec<u8> {
    let mut nonce = vec![0u8; len];
    OsRng.fill_bytes(&mut nonce);
    nonce
}
