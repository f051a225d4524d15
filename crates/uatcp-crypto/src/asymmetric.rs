//! RSA envelope primitives for the `OpenSecureChannel` exchange.
//!
//! Thin, typed wrappers over the RustCrypto `rsa` crate: block-wise
//! encrypt/decrypt with the policy's padding, PKCS#1 v1.5 signatures with the
//! policy's hash, X.509 public-key extraction, and SHA-1 thumbprints.
//! Block-size arithmetic lives here too so the envelope codec can size its
//! chunks without touching RSA internals.

use crate::policy::{AsymmetricEncryption, AsymmetricSignature, SecurityPolicy};
use crate::{Error, Result};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use x509_parser::prelude::FromDer;
use x509_parser::certificate::X509Certificate;

/// Length of a SHA-1 certificate thumbprint.
pub const THUMBPRINT_LEN: usize = 20;

/// PKCS#1 v1.5 encryption overhead per block.
const PKCS1_OVERHEAD: usize = 11;
/// OAEP-SHA1 encryption overhead per block: 2 * hLen + 2.
const OAEP_SHA1_OVERHEAD: usize = 42;

/// SHA-1 thumbprint of a DER certificate.
pub fn thumbprint(certificate_der: &[u8]) -> [u8; THUMBPRINT_LEN] {
    let digest = Sha1::digest(certificate_der);
    let mut out = [0u8; THUMBPRINT_LEN];
    out.copy_from_slice(&digest);
    out
}

/// Extract the RSA public key from a DER X.509 certificate.
pub fn public_key_from_der(certificate_der: &[u8]) -> Result<RsaPublicKey> {
    let (rest, certificate) = X509Certificate::from_der(certificate_der)
        .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
    if !rest.is_empty() {
        return Err(Error::InvalidCertificate(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }

    let spki = certificate.public_key();
    RsaPublicKey::from_pkcs1_der(&spki.subject_public_key.data)
        .map_err(|e| Error::InvalidCertificate(format!("not an RSA public key: {e}")))
}

/// Ciphertext block size for a key: the modulus length in bytes.
pub fn cipher_block_len(key: &RsaPublicKey) -> usize {
    key.size()
}

/// Plaintext bytes that fit one RSA block under the policy's padding.
pub fn plain_block_len(policy: SecurityPolicy, key: &RsaPublicKey) -> Result<usize> {
    let overhead = match policy.asymmetric_encryption() {
        Some(AsymmetricEncryption::Pkcs1V15) => PKCS1_OVERHEAD,
        Some(AsymmetricEncryption::OaepSha1) => OAEP_SHA1_OVERHEAD,
        None => {
            return Err(Error::Encryption(
                "policy has no asymmetric encryption".into(),
            ))
        }
    };
    Ok(key.size() - overhead)
}

/// Signature size produced by a key: the modulus length in bytes.
pub fn signature_len(key: &RsaPublicKey) -> usize {
    key.size()
}

/// Encrypt `plaintext` for the peer, one RSA operation per plaintext block.
///
/// `plaintext.len()` must be a whole multiple of
/// [`plain_block_len`] for this policy and key.
pub fn encrypt(
    policy: SecurityPolicy,
    key: &RsaPublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let block = plain_block_len(policy, key)?;
    if plaintext.len() % block != 0 {
        return Err(Error::InvalidLength {
            expected: plaintext.len().div_ceil(block) * block,
            actual: plaintext.len(),
        });
    }

    let mut ciphertext = Vec::with_capacity((plaintext.len() / block) * key.size());
    for chunk in plaintext.chunks(block) {
        let encrypted = match policy.asymmetric_encryption() {
            Some(AsymmetricEncryption::Pkcs1V15) => key
                .encrypt(&mut OsRng, Pkcs1v15Encrypt, chunk)
                .map_err(|e| Error::Encryption(e.to_string()))?,
            Some(AsymmetricEncryption::OaepSha1) => key
                .encrypt(&mut OsRng, Oaep::new::<Sha1>(), chunk)
                .map_err(|e| Error::Encryption(e.to_string()))?,
            None => unreachable!("checked by plain_block_len"),
        };
        ciphertext.extend_from_slice(&encrypted);
    }
    Ok(ciphertext)
}

/// Decrypt a ciphertext of whole RSA blocks with the local private key.
pub fn decrypt(
    policy: SecurityPolicy,
    key: &RsaPrivateKey,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let block = key.size();
    if ciphertext.is_empty() || ciphertext.len() % block != 0 {
        return Err(Error::InvalidLength {
            expected: ciphertext.len().div_ceil(block).max(1) * block,
            actual: ciphertext.len(),
        });
    }

    let mut plaintext = Vec::with_capacity(ciphertext.len());
    for chunk in ciphertext.chunks(block) {
        let decrypted = match policy.asymmetric_encryption() {
            Some(AsymmetricEncryption::Pkcs1V15) => key
                .decrypt(Pkcs1v15Encrypt, chunk)
                .map_err(|e| Error::Decryption(e.to_string()))?,
            Some(AsymmetricEncryption::OaepSha1) => key
                .decrypt(Oaep::new::<Sha1>(), chunk)
                .map_err(|e| Error::Decryption(e.to_string()))?,
            None => {
                return Err(Error::Decryption(
                    "policy has no asymmetric encryption".into(),
                ))
            }
        };
        plaintext.extend_from_slice(&decrypted);
    }
    Ok(plaintext)
}

/// Sign `data` with the local private key using the policy's hash.
pub fn sign(policy: SecurityPolicy, key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    match policy.asymmetric_signature() {
        Some(AsymmetricSignature::RsaSha1) => {
            let digest = Sha1::digest(data);
            key.sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
                .map_err(|e| Error::Signing(e.to_string()))
        }
        Some(AsymmetricSignature::RsaSha256) => {
            let digest = Sha256::digest(data);
            key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
                .map_err(|e| Error::Signing(e.to_string()))
        }
        None => Err(Error::Signing("policy has no asymmetric signature".into())),
    }
}

/// Verify the peer's signature over `data`.
pub fn verify(
    policy: SecurityPolicy,
    key: &RsaPublicKey,
    data: &[u8],
    signature: &[u8],
) -> Result<()> {
    match policy.asymmetric_signature() {
        Some(AsymmetricSignature::RsaSha1) => {
            let digest = Sha1::digest(data);
            key.verify(Pkcs1v15Sign::new::<Sha1>(), &digest, signature)
                .map_err(|_| Error::BadSignature)
        }
        Some(AsymmetricSignature::RsaSha256) => {
            let digest = Sha256::digest(data);
            key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
                .map_err(|_| Error::BadSignature)
        }
        None => Err(Error::BadSignature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut OsRng, 1024).expect("key generation")
    }

    #[test]
    fn test_thumbprint_is_sha1() {
        let der = b"not really DER, thumbprints hash raw bytes";
        let print = thumbprint(der);
        assert_eq!(print.len(), THUMBPRINT_LEN);
        assert_eq!(print, thumbprint(der));
        assert_ne!(print, thumbprint(b"different bytes"));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_oaep() {
        let key = test_key();
        let public = RsaPublicKey::from(&key);
        let policy = SecurityPolicy::Basic256Sha256;

        let block = plain_block_len(policy, &public).unwrap();
        let plaintext = vec![0x5Au8; block * 2];

        let ciphertext = encrypt(policy, &public, &plaintext).unwrap();
        assert_eq!(ciphertext.len(), cipher_block_len(&public) * 2);

        let decrypted = decrypt(policy, &key, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_pkcs1() {
        let key = test_key();
        let public = RsaPublicKey::from(&key);
        let policy = SecurityPolicy::Basic128Rsa15;

        let block = plain_block_len(policy, &public).unwrap();
        let plaintext = vec![0x17u8; block];

        let ciphertext = encrypt(policy, &public, &plaintext).unwrap();
        let decrypted = decrypt(policy, &key, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_rejects_partial_block() {
        let key = test_key();
        let public = RsaPublicKey::from(&key);
        let policy = SecurityPolicy::Basic256;

        let block = plain_block_len(policy, &public).unwrap();
        let result = encrypt(policy, &public, &vec![0u8; block + 1]);
        assert!(matches!(result, Err(Error::InvalidLength { .. })));
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let key = test_key();
        let public = RsaPublicKey::from(&key);

        for policy in [SecurityPolicy::Basic256, SecurityPolicy::Basic256Sha256] {
            let data = b"chunk header and plaintext body";
            let signature = sign(policy, &key, data).unwrap();
            assert_eq!(signature.len(), signature_len(&public));

            verify(policy, &public, data, &signature).unwrap();

            let mut tampered = signature.clone();
            tampered[0] ^= 0x01;
            assert!(matches!(
                verify(policy, &public, data, &tampered),
                Err(Error::BadSignature)
            ));
        }
    }

    #[test]
    fn test_public_key_from_generated_certificate() {
        // rcgen signs through ring, which requires >= 2048-bit RSA keys.
        let key = RsaPrivateKey::new(&mut OsRng, 2048).expect("key generation");
        let pkcs8 = key.to_pkcs8_der().expect("pkcs8 export");
        let key_pair = rcgen::KeyPair::try_from(pkcs8.as_bytes()).expect("rcgen key");

        let params =
            rcgen::CertificateParams::new(vec!["uatcp-test".into()]).expect("cert params");
        let certificate = params.self_signed(&key_pair).expect("self sign");
        let der = certificate.der().to_vec();

        let public = public_key_from_der(&der).expect("extract public key");
        assert_eq!(public, RsaPublicKey::from(&key));
    }

    #[test]
    fn test_malformed_certificate_rejected() {
        assert!(matches!(
            public_key_from_der(&[0x30, 0x03, 0x01, 0x02, 0x03]),
            Err(Error::InvalidCertificate(_))
        ));
    }
}
