//! Certificate store keyed by SHA-1 thumbprint.
//!
//! The asymmetric security header identifies the server's certificate by
//! thumbprint only; this store resolves it back to the DER certificate and
//! its private key.

use std::collections::HashMap;
use uatcp_crypto::asymmetric::{thumbprint, THUMBPRINT_LEN};
use uatcp_crypto::RsaPrivateKey;

/// A server certificate with its matching private key.
#[derive(Clone)]
pub struct CertificateEntry {
    /// DER-encoded X.509 certificate.
    pub certificate_der: Vec<u8>,
    /// The certificate's RSA private key.
    pub private_key: RsaPrivateKey,
}

/// In-memory thumbprint-keyed certificate store.
#[derive(Default)]
pub struct CertificateStore {
    entries: HashMap<[u8; THUMBPRINT_LEN], CertificateEntry>,
}

impl CertificateStore {
    /// An empty store. Sufficient for policy `None` endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a certificate/key pair; returns the thumbprint it is filed under.
    pub fn insert(
        &mut self,
        certificate_der: Vec<u8>,
        private_key: RsaPrivateKey,
    ) -> [u8; THUMBPRINT_LEN] {
        let print = thumbprint(&certificate_der);
        self.entries.insert(
            print,
            CertificateEntry {
                certificate_der,
                private_key,
            },
        );
        print
    }

    /// Look up by thumbprint.
    pub fn get(&self, print: &[u8; THUMBPRINT_LEN]) -> Option<&CertificateEntry> {
        self.entries.get(print)
    }

    /// Number of stored certificates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no certificates.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
