#![forbid(unsafe_code)]

//! Key loading from PEM and DER (PKCS#8, PKCS#1, SPKI, X.509).

use crate::key::{Key, KeyData};
use samlsec_core::Error;

/// Load an RSA private key from PEM data (PKCS#8 or PKCS#1).
pub fn load_rsa_private_pem(pem_data: &[u8]) -> Result<Key, Error> {
    use pkcs1::DecodeRsaPrivateKey;
    use pkcs8::DecodePrivateKey;
    let pem_str = pem_str(pem_data)?;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_pem(pem_str) {
        return Ok(Key::rsa_private(pk));
    }
    let pk = rsa::RsaPrivateKey::from_pkcs1_pem(pem_str)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key PEM: {e}")))?;
    Ok(Key::rsa_private(pk))
}

/// Load an RSA private key from DER data (PKCS#8 or PKCS#1).
pub fn load_rsa_private_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs1::DecodeRsaPrivateKey;
    use pkcs8::DecodePrivateKey;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        return Ok(Key::rsa_private(pk));
    }
    let pk = rsa::RsaPrivateKey::from_pkcs1_der(der)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key DER: {e}")))?;
    Ok(Key::rsa_private(pk))
}

/// Load an RSA public key from PEM data (SPKI or PKCS#1).
pub fn load_rsa_public_pem(pem_data: &[u8]) -> Result<Key, Error> {
    use pkcs1::DecodeRsaPublicKey;
    use spki::DecodePublicKey;
    let pem_str = pem_str(pem_data)?;

    if let Ok(pk) = rsa::RsaPublicKey::from_public_key_pem(pem_str) {
        return Ok(Key::rsa_public(pk));
    }
    let pk = rsa::RsaPublicKey::from_pkcs1_pem(pem_str)
        .map_err(|e| Error::Key(format!("failed to parse RSA public key PEM: {e}")))?;
    Ok(Key::rsa_public(pk))
}

/// Load a public key from an X.509 certificate in PEM form.
pub fn load_x509_cert_pem(pem_data: &[u8]) -> Result<Key, Error> {
    let chain = load_x509_chain_pem(pem_data)?;
    let mut key = load_x509_cert_der(&chain[0])?;
    key.x509_chain = chain;
    Ok(key)
}

/// Decode every `CERTIFICATE` block of a PEM bundle, in file order.
pub fn load_x509_chain_pem(pem_data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    const END: &str = "-----END CERTIFICATE-----";
    let text = pem_str(pem_data)?;
    let mut chain = Vec::new();
    for block in text.split_inclusive(END).filter(|b| b.contains(END)) {
        let begin = block.find("-----BEGIN").ok_or_else(|| {
            Error::Certificate("certificate block without BEGIN line".into())
        })?;
        let (label, der) = pem_rfc7468::decode_vec(block[begin..].trim().as_bytes())
            .map_err(|e| Error::Certificate(format!("failed to decode certificate PEM: {e}")))?;
        if label != "CERTIFICATE" {
            return Err(Error::Certificate(format!(
                "expected CERTIFICATE PEM label, got: {label}"
            )));
        }
        chain.push(der);
    }
    if chain.is_empty() {
        return Err(Error::Certificate("no certificate found in PEM data".into()));
    }
    Ok(chain)
}

/// Load the public key of a DER-encoded X.509 certificate.
pub fn load_x509_cert_der(data: &[u8]) -> Result<Key, Error> {
    use der::{Decode, Encode};
    use spki::DecodePublicKey;
    use x509_cert::Certificate;

    let cert = Certificate::from_der(data)
        .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;

    let data_key = if let Ok(pk) = rsa::RsaPublicKey::from_public_key_der(&spki_der) {
        KeyData::Rsa {
            private: None,
            public: pk,
        }
    } else if let Ok(vk) = dsa::VerifyingKey::from_public_key_der(&spki_der) {
        KeyData::Dsa { public: vk }
    } else {
        return Err(Error::Certificate(
            "certificate carries an unsupported public key type".into(),
        ));
    };
    Ok(Key::new(data_key).with_certificate_chain(vec![data.to_vec()]))
}

/// Load a key from PEM data, detecting its type from the PEM label.
///
/// A private key followed by certificates in the same file yields a key
/// with its certificate chain attached.
pub fn load_pem_auto(pem_data: &[u8]) -> Result<Key, Error> {
    let text = pem_str(pem_data)?;
    let has_cert = text.contains("-----BEGIN CERTIFICATE-----");
    let has_private =
        text.contains("PRIVATE KEY-----") && !text.contains("ENCRYPTED PRIVATE KEY-----");

    if has_private {
        let mut key = load_rsa_private_pem(private_block(text)?.as_bytes())?;
        if has_cert {
            key.x509_chain = load_x509_chain_pem(pem_data)?;
            let cert_key = load_x509_cert_der(&key.x509_chain[0])?;
            if !cert_key.same_public_key(&key) {
                return Err(Error::Key(
                    "certificate does not match the private key".into(),
                ));
            }
        }
        return Ok(key);
    }
    if has_cert {
        return load_x509_cert_pem(pem_data);
    }
    if let Ok(key) = load_rsa_public_pem(pem_data) {
        return Ok(key);
    }
    load_dsa_public_pem(pem_data)
        .map_err(|_| Error::Key("unable to auto-detect key format from PEM data".into()))
}

/// Load a DSA public key from SPKI PEM.
pub fn load_dsa_public_pem(pem_data: &[u8]) -> Result<Key, Error> {
    use spki::DecodePublicKey;
    let vk = dsa::VerifyingKey::from_public_key_pem(pem_str(pem_data)?)
        .map_err(|e| Error::Key(format!("failed to parse DSA public key PEM: {e}")))?;
    Ok(Key::new(KeyData::Dsa { public: vk }))
}

/// Load a key from a file: PEM (auto-detected), or DER as a certificate
/// or a private key.
pub fn load_key_file(path: &std::path::Path) -> Result<Key, Error> {
    let data = std::fs::read(path)?;
    if std::str::from_utf8(&data).map_or(false, |s| s.contains("-----BEGIN")) {
        return load_pem_auto(&data);
    }
    load_x509_cert_der(&data).or_else(|_| load_rsa_private_der(&data))
}

/// Load a private key file and attach the certificate chain from a second file.
pub fn load_key_and_cert_files(
    key_path: &std::path::Path,
    cert_path: &std::path::Path,
) -> Result<Key, Error> {
    let key = load_key_file(key_path)?;
    let cert = load_key_file(cert_path)?;
    if !cert.same_public_key(&key) {
        return Err(Error::Key(format!(
            "certificate {} does not match key {}",
            cert_path.display(),
            key_path.display()
        )));
    }
    Ok(key.with_certificate_chain(cert.x509_chain))
}

fn pem_str(pem_data: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(pem_data).map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))
}

/// The first `... PRIVATE KEY` block of a PEM bundle.
fn private_block(text: &str) -> Result<&str, Error> {
    let start = text
        .match_indices("-----BEGIN ")
        .map(|(i, _)| i)
        .find(|&i| text[i..].lines().next().map_or(false, |l| l.contains("PRIVATE KEY")))
        .ok_or_else(|| Error::Key("no private key block found".into()))?;
    let rest = &text[start..];
    let end_marker = rest
        .find("-----END ")
        .ok_or_else(|| Error::Key("unterminated private key block".into()))?;
    let end = rest[end_marker..]
        .find('\n')
        .map_or(rest.len(), |i| end_marker + i + 1);
    Ok(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNING_KEY: &str = include_str!("../../../test-data/signing-key.pem");
    const SIGNING_CERT: &str = include_str!("../../../test-data/signing-cert.pem");
    const OTHER_PUB: &str = include_str!("../../../test-data/other-pub.pem");

    #[test]
    fn loads_pkcs8_private_key() {
        let key = load_rsa_private_pem(SIGNING_KEY.as_bytes()).unwrap();
        assert!(key.has_private_key());
    }

    #[test]
    fn loads_pkcs1_private_key() {
        use pkcs1::EncodeRsaPrivateKey;
        let pk = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pem = pk.to_pkcs1_pem(pkcs1::LineEnding::LF).unwrap();
        let key = load_rsa_private_pem(pem.as_bytes()).unwrap();
        assert!(key.has_private_key());
        let der = pk.to_pkcs1_der().unwrap();
        assert!(load_rsa_private_der(der.as_bytes()).unwrap().has_private_key());
    }

    #[test]
    fn loads_spki_public_key() {
        let key = load_rsa_public_pem(OTHER_PUB.as_bytes()).unwrap();
        assert!(!key.has_private_key());
        assert!(matches!(key.data, KeyData::Rsa { .. }));
    }

    #[test]
    fn certificate_matches_private_key() {
        let cert = load_x509_cert_pem(SIGNING_CERT.as_bytes()).unwrap();
        let key = load_rsa_private_pem(SIGNING_KEY.as_bytes()).unwrap();
        assert!(cert.same_public_key(&key));
        assert_eq!(cert.x509_chain.len(), 1);
        assert!(cert.certificate().is_some());
    }

    #[test]
    fn auto_detects_combined_key_and_certificate() {
        let combined = format!("{SIGNING_KEY}{SIGNING_CERT}");
        let key = load_pem_auto(combined.as_bytes()).unwrap();
        assert!(key.has_private_key());
        assert_eq!(key.x509_chain.len(), 1);

        let public = load_pem_auto(OTHER_PUB.as_bytes()).unwrap();
        assert!(!public.has_private_key());
    }

    #[test]
    fn mismatched_certificate_is_rejected() {
        use pkcs8::EncodePrivateKey;
        let other = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pem = other.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();
        let combined = format!("{}{SIGNING_CERT}", pem.as_str());
        assert!(load_pem_auto(combined.as_bytes()).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(load_pem_auto(b"not a key").is_err());
        assert!(load_x509_chain_pem(b"").is_err());
    }
}
