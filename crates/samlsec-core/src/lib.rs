#![forbid(unsafe_code)]

//! Shared foundations for samlsec: the error type, algorithm URIs and
//! the XML-DSig / SAML namespace and node-name constants.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::Error;
