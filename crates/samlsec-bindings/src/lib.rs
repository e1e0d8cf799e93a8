#![forbid(unsafe_code)]

//! SAML 2.0 bindings.
//!
//! - **HTTP-Redirect**: messages are deflated, base64-encoded and carried in
//!   the query string, optionally signed over the exact query bytes
//! - **HTTP-POST**: messages are base64-encoded into an auto-submitting form

pub mod message;
pub mod post;
pub mod redirect;

pub use message::{DecodedMessage, SamlMessageType};
pub use post::HttpPostBinding;
pub use redirect::{HttpRedirectBindingBuilder, HttpRedirectBindingParser};
