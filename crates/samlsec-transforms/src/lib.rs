#![forbid(unsafe_code)]

//! Transform pipeline for XML-DSig references.
//!
//! Each reference carries a sequence of transforms applied in order; SAML
//! signatures use enveloped-signature followed by exclusive C14N.

pub mod enveloped;
pub mod pipeline;
pub mod uri;

pub use enveloped::EnvelopedSignatureTransform;
pub use pipeline::{C14nTransform, Transform, TransformData, TransformPipeline};
