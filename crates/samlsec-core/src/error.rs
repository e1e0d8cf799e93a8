#![forbid(unsafe_code)]

/// Errors produced by samlsec.
///
/// A signature that does not verify is not an error: verification entry
/// points report it as `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown algorithm name or URI, or key material unusable for the
    /// requested operation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid argument supplied to a builder.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A wire parameter is missing or cannot be decoded.
    #[error("malformed parameter {parameter}: {reason}")]
    Format { parameter: String, reason: String },

    /// The signed document does not have the shape the signature claims.
    #[error("signature integrity error: {0}")]
    Integrity(String),

    /// The operation is not valid for the current state of its input.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key or certificate not found: {0}")]
    KeyNotFound(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("certificate error: {0}")]
    Certificate(String),
}

impl Error {
    /// Build a [`Error::Format`] naming the offending parameter.
    pub fn format(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Format {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}
