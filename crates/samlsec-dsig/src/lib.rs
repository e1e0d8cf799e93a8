#![forbid(unsafe_code)]

//! XML Digital Signatures for SAML documents.
//!
//! Signs assertions and metadata with enveloped, exclusively canonicalized
//! signatures, and checks them against a key, a set of candidate keys or
//! the signature's own KeyInfo.

pub mod context;
pub mod sign;
pub mod verify;

pub use context::{DsigContext, Scope};
pub use sign::{sign_document, sign_element, Placement, XmlSignatureProvider};
pub use verify::{
    check_signature_with_key, check_signature_with_key_info, check_signature_with_keys,
    extract_signature_keys, is_signed,
};
