//! SAML response parsing.
//!
//! Pulls the fields the login flow needs out of a decoded `Response`
//! document: status, assertion conditions, subject, session index and the
//! attribute statement. Signature verification happens separately on the raw
//! document bytes.

use crate::error::{SsoError, SsoResult};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

pub const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

/// Fields extracted from a SAML `Response` document.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    pub response_id: Option<String>,
    pub issuer: Option<String>,
    pub status_code: Option<String>,
    pub assertion_id: Option<String>,
    pub name_id: Option<String>,
    pub name_id_format: Option<String>,
    pub session_index: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub audience: Option<String>,
    pub in_response_to: Option<String>,
    /// Attribute name -> values (SAML attributes are multi-valued).
    pub attributes: HashMap<String, Vec<String>>,
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a SAML `Response` document.
///
/// Lenient about namespace prefixes (matches on local names) since IdPs
/// differ in which prefixes they emit.
pub fn parse_response(xml: &str) -> SsoResult<ParsedResponse> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parsed = ParsedResponse::default();

    let mut in_assertion = false;
    let mut in_issuer = false;
    let mut in_name_id = false;
    let mut in_attribute_value = false;
    let mut in_audience = false;
    let mut current_attribute: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                let local = e.local_name();
                let name = std::str::from_utf8(local.as_ref()).unwrap_or("");

                match name {
                    "Response" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            let value = attr.unescape_value().unwrap_or_default().to_string();
                            match key {
                                "ID" => parsed.response_id = Some(value),
                                "InResponseTo" => parsed.in_response_to = Some(value),
                                _ => {}
                            }
                        }
                    }
                    "Assertion" => {
                        in_assertion = true;
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "ID" {
                                parsed.assertion_id =
                                    Some(attr.unescape_value().unwrap_or_default().to_string());
                            }
                        }
                    }
                    "StatusCode" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "Value" {
                                parsed.status_code =
                                    Some(attr.unescape_value().unwrap_or_default().to_string());
                            }
                        }
                    }
                    "Issuer" if !in_assertion => in_issuer = true,
                    "NameID" => {
                        in_name_id = true;
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "Format" {
                                parsed.name_id_format =
                                    Some(attr.unescape_value().unwrap_or_default().to_string());
                            }
                        }
                    }
                    "Conditions" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            let value = attr.unescape_value().unwrap_or_default();
                            match key {
                                "NotBefore" => parsed.not_before = parse_instant(&value),
                                "NotOnOrAfter" => parsed.not_on_or_after = parse_instant(&value),
                                _ => {}
                            }
                        }
                    }
                    "Audience" => in_audience = true,
                    "AuthnStatement" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "SessionIndex" {
                                parsed.session_index =
                                    Some(attr.unescape_value().unwrap_or_default().to_string());
                            }
                        }
                    }
                    "Attribute" => {
                        for attr in e.attributes().flatten() {
                            let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
                            if key == "Name" {
                                current_attribute =
                                    Some(attr.unescape_value().unwrap_or_default().to_string());
                            }
                        }
                    }
                    "AttributeValue" => in_attribute_value = true,
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                let name = std::str::from_utf8(local.as_ref()).unwrap_or("");
                match name {
                    "Assertion" => in_assertion = false,
                    "Issuer" => in_issuer = false,
                    "NameID" => in_name_id = false,
                    "Audience" => in_audience = false,
                    "AttributeValue" => in_attribute_value = false,
                    "Attribute" => current_attribute = None,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if in_issuer {
                    parsed.issuer = Some(text);
                } else if in_name_id {
                    parsed.name_id = Some(text);
                } else if in_audience {
                    parsed.audience = Some(text);
                } else if in_attribute_value {
                    if let Some(name) = &current_attribute {
                        parsed.attributes.entry(name.clone()).or_default().push(text);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SsoError::InvalidAssertion(format!("XML parse error: {e}")));
            }
            _ => {}
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp1" Version="2.0" IssueInstant="2026-01-15T10:00:00Z" InResponseTo="_req1">
  <saml:Issuer>https://idp.example.com</saml:Issuer>
  <samlp:Status>
    <samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/>
  </samlp:Status>
  <saml:Assertion ID="_assert1" Version="2.0" IssueInstant="2026-01-15T10:00:00Z">
    <saml:Issuer>https://idp.example.com</saml:Issuer>
    <saml:Subject>
      <saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">alice@acme.test</saml:NameID>
    </saml:Subject>
    <saml:Conditions NotBefore="2026-01-15T09:55:00Z" NotOnOrAfter="2026-01-15T10:05:00Z">
      <saml:AudienceRestriction>
        <saml:Audience>https://app.loopline.test/sso/org1/metadata</saml:Audience>
      </saml:AudienceRestriction>
    </saml:Conditions>
    <saml:AuthnStatement AuthnInstant="2026-01-15T10:00:00Z" SessionIndex="_session42"/>
    <saml:AttributeStatement>
      <saml:Attribute Name="email">
        <saml:AttributeValue>alice@acme.test</saml:AttributeValue>
      </saml:Attribute>
      <saml:Attribute Name="memberOf">
        <saml:AttributeValue>engineering</saml:AttributeValue>
        <saml:AttributeValue>platform</saml:AttributeValue>
      </saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#;

    #[test]
    fn test_parse_full_response() {
        let parsed = parse_response(SAMPLE_RESPONSE).unwrap();

        assert_eq!(parsed.response_id.as_deref(), Some("_resp1"));
        assert_eq!(parsed.in_response_to.as_deref(), Some("_req1"));
        assert_eq!(parsed.status_code.as_deref(), Some(STATUS_SUCCESS));
        assert_eq!(parsed.assertion_id.as_deref(), Some("_assert1"));
        assert_eq!(parsed.issuer.as_deref(), Some("https://idp.example.com"));
        assert_eq!(parsed.name_id.as_deref(), Some("alice@acme.test"));
        assert_eq!(parsed.session_index.as_deref(), Some("_session42"));
        assert_eq!(
            parsed.audience.as_deref(),
            Some("https://app.loopline.test/sso/org1/metadata")
        );
        assert!(parsed.not_before.is_some());
        assert!(parsed.not_on_or_after.is_some());

        assert_eq!(
            parsed.attributes.get("email"),
            Some(&vec!["alice@acme.test".to_string()])
        );
        assert_eq!(
            parsed.attributes.get("memberOf"),
            Some(&vec!["engineering".to_string(), "platform".to_string()])
        );
    }

    #[test]
    fn test_parse_failure_status() {
        let xml = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r">
          <samlp:Status>
            <samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Requester"/>
          </samlp:Status>
        </samlp:Response>"#;
        let parsed = parse_response(xml).unwrap();
        assert_eq!(
            parsed.status_code.as_deref(),
            Some("urn:oasis:names:tc:SAML:2.0:status:Requester")
        );
        assert!(parsed.name_id.is_none());
    }

    #[test]
    fn test_parse_malformed_xml() {
        let result = parse_response("<samlp:Response><unclosed>");
        assert!(matches!(result, Err(SsoError::InvalidAssertion(_))));
    }

    #[test]
    fn test_parse_entity_escaped_values() {
        let xml = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r">
          <saml:Assertion ID="_a">
            <saml:Subject><saml:NameID>a&amp;b@acme.test</saml:NameID></saml:Subject>
          </saml:Assertion>
        </samlp:Response>"#;
        let parsed = parse_response(xml).unwrap();
        assert_eq!(parsed.name_id.as_deref(), Some("a&b@acme.test"));
    }
}
