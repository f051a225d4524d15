//! Security policy definitions per OPC UA Part 7 §6.5.
//!
//! A policy names the complete algorithm suite for a channel: the asymmetric
//! padding and signature hash used during `OpenSecureChannel`, the P_SHA
//! variant used for key derivation, and the symmetric key and IV sizes the
//! derivation must produce.

use crate::{Error, Result};

/// Supported security policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityPolicy {
    /// No security. No certificates, no nonces, no keys.
    None,
    /// RSA PKCS#1 v1.5 + SHA-1, AES-128, P_SHA1.
    Basic128Rsa15,
    /// RSA OAEP (SHA-1) + SHA-1, AES-256, P_SHA1.
    Basic256,
    /// RSA OAEP (SHA-1) + SHA-256, AES-256, P_SHA256.
    Basic256Sha256,
}

/// Asymmetric encryption padding selected by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsymmetricEncryption {
    /// RSA PKCS#1 v1.5.
    Pkcs1V15,
    /// RSA OAEP with SHA-1 (OPC UA uses SHA-1 OAEP for all Basic policies).
    OaepSha1,
}

/// Asymmetric signature hash selected by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsymmetricSignature {
    /// RSA PKCS#1 v1.5 over SHA-1.
    RsaSha1,
    /// RSA PKCS#1 v1.5 over SHA-256.
    RsaSha256,
}

/// P_SHA pseudo-random function variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivationHash {
    /// P_SHA1 (HMAC-SHA-1).
    Sha1,
    /// P_SHA256 (HMAC-SHA-256).
    Sha256,
}

const URI_NONE: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";
const URI_BASIC128_RSA15: &str = "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15";
const URI_BASIC256: &str = "http://opcfoundation.org/UA/SecurityPolicy#Basic256";
const URI_BASIC256_SHA256: &str = "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256";

impl SecurityPolicy {
    /// The policy URI carried in the asymmetric security header.
    pub const fn uri(self) -> &'static str {
        match self {
            Self::None => URI_NONE,
            Self::Basic128Rsa15 => URI_BASIC128_RSA15,
            Self::Basic256 => URI_BASIC256,
            Self::Basic256Sha256 => URI_BASIC256_SHA256,
        }
    }

    /// Resolve a policy from its URI.
    pub fn from_uri(uri: &str) -> Result<Self> {
        match uri {
            URI_NONE => Ok(Self::None),
            URI_BASIC128_RSA15 => Ok(Self::Basic128Rsa15),
            URI_BASIC256 => Ok(Self::Basic256),
            URI_BASIC256_SHA256 => Ok(Self::Basic256Sha256),
            other => Err(Error::UnsupportedPolicy(other.to_string())),
        }
    }

    /// Whether the asymmetric envelope encrypts and signs at all.
    pub fn is_security_enabled(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Padding for asymmetric encryption; `None` policy has no envelope.
    pub fn asymmetric_encryption(self) -> Option<AsymmetricEncryption> {
        match self {
            Self::None => None,
            Self::Basic128Rsa15 => Some(AsymmetricEncryption::Pkcs1V15),
            Self::Basic256 | Self::Basic256Sha256 => Some(AsymmetricEncryption::OaepSha1),
        }
    }

    /// Hash for the asymmetric signature; `None` policy has no envelope.
    pub fn asymmetric_signature(self) -> Option<AsymmetricSignature> {
        match self {
            Self::None => None,
            Self::Basic128Rsa15 | Self::Basic256 => Some(AsymmetricSignature::RsaSha1),
            Self::Basic256Sha256 => Some(AsymmetricSignature::RsaSha256),
        }
    }

    /// P_SHA variant for symmetric key derivation.
    pub fn key_derivation_hash(self) -> KeyDerivationHash {
        match self {
            Self::Basic256Sha256 => KeyDerivationHash::Sha256,
            _ => KeyDerivationHash::Sha1,
        }
    }

    /// Length of each party's nonce: the symmetric encryption key size.
    pub fn nonce_len(self) -> usize {
        self.symmetric_encryption_key_len()
    }

    /// Derived symmetric signing key length in bytes.
    pub fn symmetric_signature_key_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::Basic128Rsa15 => 16,
            Self::Basic256 => 24,
            Self::Basic256Sha256 => 32,
        }
    }

    /// Derived symmetric encryption key length in bytes.
    pub fn symmetric_encryption_key_len(self) -> usize {
        match self {
            Self::None => 0,
            Self::Basic128Rsa15 => 16,
            Self::Basic256 | Self::Basic256Sha256 => 32,
        }
    }

    /// Derived initialization vector length in bytes (AES block size).
    pub fn symmetric_iv_len(self) -> usize {
        match self {
            Self::None => 0,
            _ => 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_roundtrip() {
        for policy in [
            SecurityPolicy::None,
            SecurityPolicy::Basic128Rsa15,
            SecurityPolicy::Basic256,
            SecurityPolicy::Basic256Sha256,
        ] {
            assert_eq!(SecurityPolicy::from_uri(policy.uri()).unwrap(), policy);
        }
    }

    #[test]
    fn test_unknown_uri_rejected() {
        let result = SecurityPolicy::from_uri("http://opcfoundation.org/UA/SecurityPolicy#Aes256");
        assert!(matches!(result, Err(Error::UnsupportedPolicy(_))));
    }

    #[test]
    fn test_key_lengths() {
        assert_eq!(SecurityPolicy::Basic128Rsa15.symmetric_signature_key_len(), 16);
        assert_eq!(SecurityPolicy::Basic256.symmetric_signature_key_len(), 24);
        assert_eq!(SecurityPolicy::Basic256Sha256.symmetric_signature_key_len(), 32);

        assert_eq!(SecurityPolicy::Basic128Rsa15.nonce_len(), 16);
        assert_eq!(SecurityPolicy::Basic256.nonce_len(), 32);
        assert_eq!(SecurityPolicy::Basic256Sha256.nonce_len(), 32);

        assert_eq!(SecurityPolicy::None.nonce_len(), 0);
        assert_eq!(SecurityPolicy::None.symmetric_iv_len(), 0);
    }

    #[test]
    fn test_algorithm_selection() {
        assert_eq!(SecurityPolicy::None.asymmetric_encryption(), None);
        assert_eq!(
            SecurityPolicy::Basic128Rsa15.asymmetric_encryption(),
            Some(AsymmetricEncryption::Pkcs1V15)
        );
        assert_eq!(
            SecurityPolicy::Basic256Sha256.asymmetric_encryption(),
            Some(AsymmetricEncryption::OaepSha1)
        );
        assert_eq!(
            SecurityPolicy::Basic256Sha256.asymmetric_signature(),
            Some(AsymmetricSignature::RsaSha256)
        );
        assert_eq!(
            SecurityPolicy::Basic256.key_derivation_hash(),
            KeyDerivationHash::Sha1
        );
        assert_eq!(
            SecurityPolicy::Basic256Sha256.key_derivation_hash(),
            KeyDerivationHash::Sha256
        );
    }
}
