#![forbid(unsafe_code)]

//! Key types and data structures.

use samlsec_crypto::SigningKey;

/// The underlying key data.
#[derive(Clone)]
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    Dsa {
        public: dsa::VerifyingKey,
    },
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa { private, .. } => {
                if private.is_some() {
                    write!(f, "RSA private+public key")
                } else {
                    write!(f, "RSA public key")
                }
            }
            Self::Dsa { .. } => write!(f, "DSA public key"),
        }
    }
}

/// A key, optionally named and bound to an X.509 certificate chain.
#[derive(Debug, Clone)]
pub struct Key {
    /// Optional name, written as `<KeyName>`.
    pub name: Option<String>,
    pub data: KeyData,
    /// DER-encoded certificates, leaf first.
    pub x509_chain: Vec<Vec<u8>>,
}

impl Key {
    pub fn new(data: KeyData) -> Self {
        Self {
            name: None,
            data,
            x509_chain: Vec::new(),
        }
    }

    /// An RSA key with its private half.
    pub fn rsa_private(private: rsa::RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self::new(KeyData::Rsa {
            private: Some(private),
            public,
        })
    }

    /// An RSA public key.
    pub fn rsa_public(public: rsa::RsaPublicKey) -> Self {
        Self::new(KeyData::Rsa {
            private: None,
            public,
        })
    }

    /// Set the key name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a certificate chain (DER, leaf first).
    pub fn with_certificate_chain(mut self, chain: Vec<Vec<u8>>) -> Self {
        self.x509_chain = chain;
        self
    }

    pub fn has_private_key(&self) -> bool {
        matches!(self.data, KeyData::Rsa { private: Some(_), .. })
    }

    /// Key material for signing; `None` without a private key.
    pub fn to_signing_key(&self) -> Option<SigningKey> {
        match &self.data {
            KeyData::Rsa {
                private: Some(pk), ..
            } => Some(SigningKey::Rsa(pk.clone())),
            _ => None,
        }
    }

    /// Public key material for verification.
    pub fn to_verifying_key(&self) -> SigningKey {
        match &self.data {
            KeyData::Rsa { public, .. } => SigningKey::RsaPublic(public.clone()),
            KeyData::Dsa { public } => SigningKey::DsaPublic(public.clone()),
        }
    }

    /// The leaf certificate, if a chain is attached.
    pub fn certificate(&self) -> Option<&[u8]> {
        self.x509_chain.first().map(Vec::as_slice)
    }

    /// True if both keys carry the same public key.
    pub fn same_public_key(&self, other: &Key) -> bool {
        match (&self.data, &other.data) {
            (KeyData::Rsa { public: a, .. }, KeyData::Rsa { public: b, .. }) => a == b,
            (KeyData::Dsa { public: a }, KeyData::Dsa { public: b }) => {
                a.y() == b.y() && a.components().p() == b.components().p()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_exposes_both_halves() {
        let pk = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let key = Key::rsa_private(pk.clone()).with_name("idp");
        assert!(key.has_private_key());
        assert!(matches!(key.to_signing_key(), Some(SigningKey::Rsa(_))));
        assert!(matches!(key.to_verifying_key(), SigningKey::RsaPublic(_)));
        assert_eq!(key.name.as_deref(), Some("idp"));

        let public = Key::rsa_public(pk.to_public_key());
        assert!(!public.has_private_key());
        assert!(public.to_signing_key().is_none());
        assert!(public.same_public_key(&key));
        assert_eq!(format!("{:?}", public.data), "RSA public key");
    }
}
