#![forbid(unsafe_code)]

//! Selection of signature providers by wire URI, configured SHA strength
//! or key type.

use std::fmt;
use std::str::FromStr;

use samlsec_core::{algorithm, Error};

use crate::sign::{DsaSha1, RsaPkcs1v15, SignatureProvider, SigningKey};

/// Configured hash strength for outgoing signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaHashingAlgorithm {
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl ShaHashingAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }

    /// The RSA signature method URI for this strength.
    pub fn rsa_signature_uri(&self) -> &'static str {
        match self {
            Self::Sha1 => algorithm::RSA_SHA1,
            Self::Sha256 => algorithm::RSA_SHA256,
            Self::Sha512 => algorithm::RSA_SHA512,
        }
    }

    pub fn digest_uri(&self) -> &'static str {
        match self {
            Self::Sha1 => algorithm::SHA1,
            Self::Sha256 => algorithm::SHA256,
            Self::Sha512 => algorithm::SHA512,
        }
    }
}

impl fmt::Display for ShaHashingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShaHashingAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_sha_hashing_algorithm(s)
    }
}

/// Parse a configured algorithm name; only `SHA1`, `SHA256` and `SHA512`
/// (any letter case) are accepted.
pub fn validate_sha_hashing_algorithm(name: &str) -> Result<ShaHashingAlgorithm, Error> {
    match name.trim().to_ascii_uppercase().as_str() {
        "SHA1" => Ok(ShaHashingAlgorithm::Sha1),
        "SHA256" => Ok(ShaHashingAlgorithm::Sha256),
        "SHA512" => Ok(ShaHashingAlgorithm::Sha512),
        _ => Err(Error::Configuration(format!(
            "unsupported SHA hashing algorithm {name:?}; expected SHA1, SHA256 or SHA512"
        ))),
    }
}

type Constructor = fn() -> Box<dyn SignatureProvider>;

/// Every provider known by URI.
const REGISTRY: &[(&str, Constructor)] = &[
    (algorithm::RSA_SHA1, rsa_sha1),
    (algorithm::RSA_SHA256, rsa_sha256),
    (algorithm::RSA_SHA512, rsa_sha512),
    (algorithm::DSA_SHA1, dsa_sha1),
];

fn rsa_sha1() -> Box<dyn SignatureProvider> {
    Box::new(RsaPkcs1v15::sha1())
}

fn rsa_sha256() -> Box<dyn SignatureProvider> {
    Box::new(RsaPkcs1v15::sha256())
}

fn rsa_sha512() -> Box<dyn SignatureProvider> {
    Box::new(RsaPkcs1v15::sha512())
}

fn dsa_sha1() -> Box<dyn SignatureProvider> {
    Box::new(DsaSha1)
}

/// Central lookup for signature providers.
pub struct SignatureProviderFactory;

impl SignatureProviderFactory {
    /// Map a wire signature-method URI to its provider.
    pub fn create_from_signature_uri(uri: &str) -> Result<Box<dyn SignatureProvider>, Error> {
        REGISTRY
            .iter()
            .find(|(known, _)| *known == uri)
            .map(|(_, ctor)| ctor())
            .ok_or_else(|| Error::Configuration(format!("unsupported signature algorithm: {uri}")))
    }

    /// The RSA provider for a configured SHA strength.
    pub fn create_from_hashing_algorithm(alg: ShaHashingAlgorithm) -> Box<dyn SignatureProvider> {
        match alg {
            ShaHashingAlgorithm::Sha1 => rsa_sha1(),
            ShaHashingAlgorithm::Sha256 => rsa_sha256(),
            ShaHashingAlgorithm::Sha512 => rsa_sha512(),
        }
    }

    /// The provider for signing with `key` at the configured strength.
    pub fn for_signing_key(
        key: &SigningKey,
        alg: ShaHashingAlgorithm,
    ) -> Result<Box<dyn SignatureProvider>, Error> {
        match key {
            SigningKey::Rsa(_) => {
                let provider = Self::create_from_hashing_algorithm(alg);
                tracing::debug!(uri = provider.uri(), "selected signature provider");
                Ok(provider)
            }
            other => Err(Error::Configuration(format!(
                "cannot sign with a {} key",
                other.kind()
            ))),
        }
    }

    /// URIs of all registered providers.
    pub fn supported_uris() -> impl Iterator<Item = &'static str> {
        REGISTRY.iter().map(|(uri, _)| *uri)
    }
}
