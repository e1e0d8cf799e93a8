#![forbid(unsafe_code)]

//! Signature providers: RSA PKCS#1 v1.5 with SHA-1/256/512, and DSA-SHA1
//! verification for XML signatures carrying a `DSAKeyValue`.

use samlsec_core::{algorithm, Error};
use signature::SignatureEncoding;

/// Key material for signature operations.
#[derive(Clone)]
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    DsaPublic(dsa::VerifyingKey),
}

impl SigningKey {
    /// Short name of the key type, for log and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SigningKey::Rsa(_) => "RSA private",
            SigningKey::RsaPublic(_) => "RSA public",
            SigningKey::DsaPublic(_) => "DSA public",
        }
    }

    pub fn has_private(&self) -> bool {
        matches!(self, SigningKey::Rsa(_))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey({})", self.kind())
    }
}

/// One signature algorithm.
///
/// Providers hold no mutable state and may be shared between threads.
pub trait SignatureProvider: Send + Sync {
    /// Signature method URI, as used in `SignatureMethod` and `SigAlg`.
    fn uri(&self) -> &'static str;

    /// Digest URI used for XML `Reference` elements signed with this provider.
    fn digest_uri(&self) -> &'static str;

    /// Digest `data` and sign it with the private key.
    fn sign_data(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Check `signature` over `data`. Any failure, including a key of the
    /// wrong type or a malformed signature, is reported as `false`.
    fn verify_signature(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HashType {
    Sha1,
    Sha256,
    Sha512,
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

/// RSA PKCS#1 v1.5 with an explicit hash.
#[derive(Debug, Clone, Copy)]
pub struct RsaPkcs1v15 {
    uri: &'static str,
    digest_uri: &'static str,
    hash: HashType,
}

impl RsaPkcs1v15 {
    pub fn sha1() -> Self {
        Self {
            uri: algorithm::RSA_SHA1,
            digest_uri: algorithm::SHA1,
            hash: HashType::Sha1,
        }
    }

    pub fn sha256() -> Self {
        Self {
            uri: algorithm::RSA_SHA256,
            digest_uri: algorithm::SHA256,
            hash: HashType::Sha256,
        }
    }

    pub fn sha512() -> Self {
        Self {
            uri: algorithm::RSA_SHA512,
            digest_uri: algorithm::SHA512,
            hash: HashType::Sha512,
        }
    }

    /// The key is bound to the provider's hash by wrapping it in a
    /// hash-typed PKCS#1 v1.5 signing key.
    fn sign_with_key(&self, private_key: &rsa::RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
                sk.try_sign(data)
                    .map(|sig| sig.to_vec())
                    .map_err(|e| Error::Crypto(format!("RSA signing failed: {e}")))
            }};
        }
        match self.hash {
            HashType::Sha1 => do_sign!(sha1::Sha1),
            HashType::Sha256 => do_sign!(sha2::Sha256),
            HashType::Sha512 => do_sign!(sha2::Sha512),
        }
    }

    fn verify_with_key(&self, public_key: &rsa::RsaPublicKey, data: &[u8], sig_bytes: &[u8]) -> bool {
        use signature::Verifier;
        let Ok(sig) = rsa::pkcs1v15::Signature::try_from(sig_bytes) else {
            tracing::debug!("malformed RSA signature value");
            return false;
        };
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
                vk.verify(data, &sig).is_ok()
            }};
        }
        match self.hash {
            HashType::Sha1 => do_verify!(sha1::Sha1),
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        }
    }
}

impl SignatureProvider for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn digest_uri(&self) -> &'static str {
        self.digest_uri
    }

    fn sign_data(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        match key {
            SigningKey::Rsa(pk) => self.sign_with_key(pk, data),
            other => Err(Error::Configuration(format!(
                "{} requires an RSA private key, got {}",
                self.uri,
                other.kind()
            ))),
        }
    }

    fn verify_signature(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> bool {
        match key {
            SigningKey::Rsa(pk) => self.verify_with_key(&pk.to_public_key(), data, signature),
            SigningKey::RsaPublic(pk) => self.verify_with_key(pk, data, signature),
            other => {
                tracing::debug!(uri = self.uri, key = other.kind(), "key type does not match provider");
                false
            }
        }
    }
}

// ── DSA ──────────────────────────────────────────────────────────────

/// DSA with SHA-1. Verification only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DsaSha1;

impl SignatureProvider for DsaSha1 {
    fn uri(&self) -> &'static str {
        algorithm::DSA_SHA1
    }

    fn digest_uri(&self) -> &'static str {
        algorithm::SHA1
    }

    fn sign_data(&self, _key: &SigningKey, _data: &[u8]) -> Result<Vec<u8>, Error> {
        Err(Error::Configuration("DSA signing is not supported".into()))
    }

    fn verify_signature(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> bool {
        use digest::Digest;
        use signature::DigestVerifier;

        let SigningKey::DsaPublic(vk) = key else {
            tracing::debug!(key = key.kind(), "DSA-SHA1 needs a DSA key");
            return false;
        };
        // XML-DSig encodes the signature as r || s, each 20 octets.
        if signature.len() != 40 {
            return false;
        }
        let r = dsa::BigUint::from_bytes_be(&signature[..20]);
        let s = dsa::BigUint::from_bytes_be(&signature[20..]);
        let Ok(sig) = dsa::Signature::from_components(r, s) else {
            return false;
        };
        vk.verify_digest(sha1::Sha1::new_with_prefix(data), &sig).is_ok()
    }
}
