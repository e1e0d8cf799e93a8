#![forbid(unsafe_code)]

//! SAML 2.0 XML signatures and HTTP bindings.
//!
//! Facade over the `samlsec-*` crates.

pub use samlsec_bindings as bindings;
pub use samlsec_c14n as c14n;
pub use samlsec_core as core;
pub use samlsec_crypto as crypto;
pub use samlsec_dsig as dsig;
pub use samlsec_keys as keys;
pub use samlsec_transforms as transforms;
pub use samlsec_xml as xml;

pub use samlsec_core::Error;
