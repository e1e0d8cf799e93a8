#![forbid(unsafe_code)]

//! Digests and signature providers for samlsec.
//!
//! A [`SignatureProvider`] encapsulates one signature algorithm: its wire
//! URI, the digest used for XML references, and raw sign/verify.  The
//! [`SignatureProviderFactory`] selects providers by URI, by configured
//! SHA strength, or by key type.

pub mod digest;
pub mod factory;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use factory::{validate_sha_hashing_algorithm, ShaHashingAlgorithm, SignatureProviderFactory};
pub use sign::{SignatureProvider, SigningKey};
