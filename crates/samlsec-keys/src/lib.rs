#![forbid(unsafe_code)]

//! Key handling for samlsec.
//!
//! Loads keys from PEM and DER, reads and writes `<ds:KeyInfo>`, and keeps
//! ordered candidate sets of verification keys.

pub mod candidates;
pub mod key;
pub mod keyinfo;
pub mod loader;

pub use candidates::KeyCandidateSet;
pub use key::{Key, KeyData};
pub use keyinfo::{KeyInfo, KeyInfoClause};
