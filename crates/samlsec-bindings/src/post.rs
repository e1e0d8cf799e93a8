#![forbid(unsafe_code)]

//! HTTP-POST binding.
//!
//! Messages are base64-encoded (no compression) into a hidden form field
//! of an auto-submitting HTML page.

use samlsec_core::Error;

use crate::message::{
    base64_decode, base64_encode, utf8, DecodedMessage, SamlMessageType, SAML_REQUEST,
    SAML_RESPONSE,
};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// The form value for `xml`.
    pub fn encode(xml: &str) -> String {
        base64_encode(xml.as_bytes())
    }

    /// An HTML page that posts `xml` to `destination` on load.
    pub fn render_form(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> String {
        let relay_state_input = relay_state
            .map(|rs| {
                format!(
                    r#"
        <input type="hidden" name="RelayState" value="{}"/>"#,
                    html_escape(rs)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>{}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            html_escape(destination),
            message_type.param_name(),
            Self::encode(xml),
            relay_state_input
        )
    }

    /// Decode received form values. Exactly one of `saml_request` and
    /// `saml_response` must be present.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> Result<DecodedMessage, Error> {
        let (encoded, message_type) = match (saml_request, saml_response) {
            (Some(req), None) => (req, SamlMessageType::Request),
            (None, Some(resp)) => (resp, SamlMessageType::Response),
            (Some(_), Some(_)) => {
                return Err(Error::format(
                    SAML_REQUEST,
                    "both SAMLRequest and SAMLResponse are present",
                ))
            }
            (None, None) => {
                return Err(Error::format(
                    SAML_REQUEST,
                    "missing SAMLRequest or SAMLResponse",
                ))
            }
        };
        let name = message_type.param_name();
        let xml = utf8(name, base64_decode(name, encoded)?)?;
        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state: relay_state.map(String::from),
        })
    }
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_carries_escaped_values() {
        let html = HttpPostBinding::render_form(
            "<samlp:Response/>",
            "https://sp.test/acs?a=1&b=\"2\"",
            Some("<state>"),
            SamlMessageType::Response,
        );
        assert!(html.contains(r#"action="https://sp.test/acs?a=1&amp;b=&quot;2&quot;""#));
        assert!(html.contains(r#"name="SAMLResponse""#));
        assert!(html.contains(&HttpPostBinding::encode("<samlp:Response/>")));
        assert!(html.contains(r#"name="RelayState" value="&lt;state&gt;""#));

        let bare = HttpPostBinding::render_form("<r/>", "https://idp.test/sso", None, SamlMessageType::Request);
        assert!(bare.contains(r#"name="SAMLRequest""#));
        assert!(!bare.contains("RelayState"));
    }

    #[test]
    fn decode_round_trip() {
        let xml = "<samlp:Response>Grüße 日本</samlp:Response>";
        let encoded = HttpPostBinding::encode(xml);
        let decoded = HttpPostBinding::decode(None, Some(&encoded), Some("rs")).unwrap();
        assert_eq!(decoded.xml, xml);
        assert_eq!(decoded.message_type, SamlMessageType::Response);
        assert_eq!(decoded.relay_state.as_deref(), Some("rs"));
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert!(matches!(
            HttpPostBinding::decode(Some("QQ=="), Some("QQ=="), None),
            Err(Error::Format { .. })
        ));
        assert!(HttpPostBinding::decode(None, None, None).is_err());
        match HttpPostBinding::decode(None, Some("not base64!"), None) {
            Err(Error::Format { parameter, .. }) => assert_eq!(parameter, SAML_RESPONSE),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
