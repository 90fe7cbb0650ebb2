//! XML signature verification for SAML responses.
//!
//! Verifies enveloped signatures: the RSA signature over the `SignedInfo`
//! element and the reference digest over the document with the `Signature`
//! element removed. `SignedInfo` is taken as the exact byte range from the
//! document so the verified bytes are the bytes the IdP signed; the IdP must
//! declare the dsig namespace on the `Signature` subtree (every mainstream
//! IdP does).

use crate::error::{SsoError, SsoResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::sign::{Signer, Verifier};
use openssl::x509::X509;

pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

const DIGEST_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const DIGEST_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
const DIGEST_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
const DIGEST_SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

/// Raw pieces of an enveloped signature.
#[derive(Debug, Clone)]
pub struct SignatureInfo {
    /// Exact bytes of the `SignedInfo` element, start tag through end tag.
    pub signed_info: String,
    pub signature_value: String,
    pub digest_value: String,
    pub signature_method: String,
    pub digest_method: String,
}

fn signature_digest(algorithm: &str) -> SsoResult<MessageDigest> {
    match algorithm {
        RSA_SHA256 => Ok(MessageDigest::sha256()),
        RSA_SHA1 => Ok(MessageDigest::sha1()),
        RSA_SHA384 => Ok(MessageDigest::sha384()),
        RSA_SHA512 => Ok(MessageDigest::sha512()),
        other => Err(SsoError::InvalidAssertion(format!(
            "Unsupported signature algorithm: {other}"
        ))),
    }
}

fn reference_digest(algorithm: &str) -> SsoResult<MessageDigest> {
    match algorithm {
        DIGEST_SHA256 => Ok(MessageDigest::sha256()),
        DIGEST_SHA1 => Ok(MessageDigest::sha1()),
        DIGEST_SHA384 => Ok(MessageDigest::sha384()),
        DIGEST_SHA512 => Ok(MessageDigest::sha512()),
        other => Err(SsoError::InvalidAssertion(format!(
            "Unsupported digest algorithm: {other}"
        ))),
    }
}

/// Find the byte range of the first element with the given local name,
/// whatever its namespace prefix. Returns (start, end_exclusive, qualified
/// name). The end tag is matched on the qualified name so prefixed documents
/// round-trip byte-exactly.
fn find_element_range(xml: &str, local: &str) -> Option<(usize, usize, String)> {
    let bytes = xml.as_bytes();
    let mut pos = 0;
    while let Some(offset) = xml[pos..].find('<') {
        let start = pos + offset;
        let rest = &xml[start + 1..];
        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let qname = &rest[..name_end];
        let matches = qname == local
            || (qname.len() > local.len()
                && qname.ends_with(local)
                && bytes.get(start + 1 + qname.len() - local.len() - 1) == Some(&b':'));
        if matches {
            let tag_close = xml[start..].find('>')? + start;
            // Self-closing element
            if xml.as_bytes().get(tag_close.wrapping_sub(1)) == Some(&b'/') {
                return Some((start, tag_close + 1, qname.to_string()));
            }
            let end_tag = format!("</{qname}>");
            let end_start = xml[tag_close..].find(&end_tag)? + tag_close;
            return Some((start, end_start + end_tag.len(), qname.to_string()));
        }
        pos = start + 1;
    }
    None
}

/// Inner text of the first element with the given local name.
fn extract_text(xml: &str, local: &str) -> Option<String> {
    let (start, end, qname) = find_element_range(xml, local)?;
    let block = &xml[start..end];
    let open_close = block.find('>')?;
    let end_tag = format!("</{qname}>");
    let inner_end = block.rfind(&end_tag)?;
    if open_close + 1 > inner_end {
        return None;
    }
    Some(block[open_close + 1..inner_end].trim().to_string())
}

/// Value of an attribute on the first element with the given local name.
fn extract_attr(xml: &str, local: &str, attr: &str) -> Option<String> {
    let (start, end, _) = find_element_range(xml, local)?;
    let block = &xml[start..end];
    let tag_end = block.find('>')?;
    let tag = &block[..tag_end];
    let needle = format!("{attr}=\"");
    let attr_start = tag.find(&needle)? + needle.len();
    let attr_end = tag[attr_start..].find('"')? + attr_start;
    Some(tag[attr_start..attr_end].to_string())
}

/// Extract the signature components from a signed document. `Ok(None)` means
/// the document carries no `Signature` element.
pub fn extract_signature_info(xml: &str) -> SsoResult<Option<SignatureInfo>> {
    let Some((sig_start, sig_end, _)) = find_element_range(xml, "Signature") else {
        return Ok(None);
    };
    let signature_block = &xml[sig_start..sig_end];

    let (si_start, si_end, _) = find_element_range(signature_block, "SignedInfo").ok_or_else(
        || SsoError::InvalidAssertion("Signature element has no SignedInfo".to_string()),
    )?;
    let signed_info = signature_block[si_start..si_end].to_string();

    let signature_value = extract_text(signature_block, "SignatureValue").ok_or_else(|| {
        SsoError::InvalidAssertion("Signature element has no SignatureValue".to_string())
    })?;
    let digest_value = extract_text(&signed_info, "DigestValue").ok_or_else(|| {
        SsoError::InvalidAssertion("SignedInfo has no DigestValue".to_string())
    })?;
    let signature_method =
        extract_attr(&signed_info, "SignatureMethod", "Algorithm").ok_or_else(|| {
            SsoError::InvalidAssertion("SignedInfo has no SignatureMethod".to_string())
        })?;
    let digest_method =
        extract_attr(&signed_info, "DigestMethod", "Algorithm").ok_or_else(|| {
            SsoError::InvalidAssertion("SignedInfo has no DigestMethod".to_string())
        })?;

    Ok(Some(SignatureInfo {
        signed_info,
        signature_value,
        digest_value,
        signature_method,
        digest_method,
    }))
}

/// Remove the first `Signature` element from the document, yielding the bytes
/// the reference digest covers.
pub fn remove_signature_element(xml: &str) -> String {
    match find_element_range(xml, "Signature") {
        Some((start, end, _)) => format!("{}{}", &xml[..start], &xml[end..]),
        None => xml.to_string(),
    }
}

/// Parse an X.509 certificate from PEM, tolerating stored certificates with
/// the armor headers stripped.
pub fn parse_certificate(pem: &str) -> SsoResult<X509> {
    let trimmed = pem.trim();
    let armored = if trimmed.contains("-----BEGIN CERTIFICATE-----") {
        trimmed.to_string()
    } else {
        let body: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
        let mut lines = String::from("-----BEGIN CERTIFICATE-----\n");
        for chunk in body.as_bytes().chunks(64) {
            lines.push_str(std::str::from_utf8(chunk).map_err(|_| {
                SsoError::InvalidConfiguration("Certificate is not valid base64".to_string())
            })?);
            lines.push('\n');
        }
        lines.push_str("-----END CERTIFICATE-----\n");
        lines
    };

    X509::from_pem(armored.as_bytes())
        .map_err(|e| SsoError::InvalidConfiguration(format!("Invalid IdP certificate: {e}")))
}

/// Verify the enveloped signature on a SAML document against the IdP
/// certificate. Checks both the reference digest and the RSA signature; an
/// unsigned document is rejected.
pub fn verify_enveloped_signature(xml: &str, certificate_pem: &str) -> SsoResult<()> {
    let info = extract_signature_info(xml)?
        .ok_or_else(|| SsoError::InvalidAssertion("Response is not signed".to_string()))?;

    // Reference digest over the document with the signature removed.
    let digest_md = reference_digest(&info.digest_method)?;
    let doc_without_signature = remove_signature_element(xml);
    let computed = openssl::hash::hash(digest_md, doc_without_signature.as_bytes())
        .map_err(|e| SsoError::Internal(format!("Digest computation failed: {e}")))?;
    let expected = BASE64
        .decode(strip_whitespace(&info.digest_value))
        .map_err(|_| SsoError::InvalidAssertion("DigestValue is not valid base64".to_string()))?;
    if computed.as_ref() != expected.as_slice() {
        return Err(SsoError::InvalidAssertion(
            "Reference digest mismatch".to_string(),
        ));
    }

    // RSA signature over the SignedInfo bytes.
    let cert = parse_certificate(certificate_pem)?;
    let public_key: PKey<Public> = cert
        .public_key()
        .map_err(|e| SsoError::InvalidConfiguration(format!("Invalid certificate key: {e}")))?;
    let signature = BASE64
        .decode(strip_whitespace(&info.signature_value))
        .map_err(|_| {
            SsoError::InvalidAssertion("SignatureValue is not valid base64".to_string())
        })?;

    let md = signature_digest(&info.signature_method)?;
    let mut verifier = Verifier::new(md, &public_key)
        .map_err(|e| SsoError::Internal(format!("Verifier init failed: {e}")))?;
    verifier
        .update(info.signed_info.as_bytes())
        .map_err(|e| SsoError::Internal(format!("Verifier update failed: {e}")))?;
    let valid = verifier
        .verify(&signature)
        .map_err(|e| SsoError::Internal(format!("Verification failed: {e}")))?;

    if !valid {
        return Err(SsoError::InvalidAssertion(
            "Signature verification failed".to_string(),
        ));
    }
    Ok(())
}

/// Sign the query string for the HTTP-Redirect binding
/// (`SAMLRequest=...&RelayState=...&SigAlg=...`). Returns the base64
/// signature to append as the `Signature` parameter.
pub fn sign_redirect_payload(payload: &str, private_key: &PKey<Private>) -> SsoResult<String> {
    let mut signer = Signer::new(MessageDigest::sha256(), private_key)
        .map_err(|e| SsoError::Internal(format!("Signer init failed: {e}")))?;
    signer
        .update(payload.as_bytes())
        .map_err(|e| SsoError::Internal(format!("Signer update failed: {e}")))?;
    let signature = signer
        .sign_to_vec()
        .map_err(|e| SsoError::Internal(format!("Signing failed: {e}")))?;
    Ok(BASE64.encode(signature))
}

fn strip_whitespace(s: &str) -> Vec<u8> {
    s.bytes().filter(|b| !b.is_ascii_whitespace()).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Builds signed SAML documents the same way an IdP would, for use by
    //! signature and client tests.

    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::bn::{BigNum, MsbOption};
    use openssl::rsa::Rsa;
    use openssl::x509::X509NameBuilder;

    pub fn generate_idp_keypair() -> (PKey<Private>, String) {
        let rsa = Rsa::generate(2048).unwrap();
        let key = PKey::from_rsa(rsa).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "idp.example.com").unwrap();
        let name = name.build();

        let serial = {
            let mut bn = BigNum::new().unwrap();
            bn.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
            bn.to_asn1_integer().unwrap()
        };

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        let cert = builder.build();

        let pem = String::from_utf8(cert.to_pem().unwrap()).unwrap();
        (key, pem)
    }

    /// Insert an enveloped signature before the closing tag of the document
    /// root. The digest covers the document without the signature; the RSA
    /// signature covers the exact `SignedInfo` bytes.
    pub fn sign_document(xml: &str, key: &PKey<Private>) -> String {
        let digest = openssl::hash::hash(MessageDigest::sha256(), xml.as_bytes()).unwrap();
        let digest_b64 = BASE64.encode(digest);

        let reference_uri = extract_attr(xml, "Response", "ID")
            .map(|id| format!("#{id}"))
            .unwrap_or_default();

        let signed_info = format!(
            "<ds:SignedInfo xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\
<ds:CanonicalizationMethod Algorithm=\"http://www.w3.org/2001/10/xml-exc-c14n#\"/>\
<ds:SignatureMethod Algorithm=\"{RSA_SHA256}\"/>\
<ds:Reference URI=\"{reference_uri}\">\
<ds:Transforms>\
<ds:Transform Algorithm=\"http://www.w3.org/2000/09/xmldsig#enveloped-signature\"/>\
</ds:Transforms>\
<ds:DigestMethod Algorithm=\"{DIGEST_SHA256}\"/>\
<ds:DigestValue>{digest_b64}</ds:DigestValue>\
</ds:Reference>\
</ds:SignedInfo>"
        );

        let mut signer = Signer::new(MessageDigest::sha256(), key).unwrap();
        signer.update(signed_info.as_bytes()).unwrap();
        let signature_b64 = BASE64.encode(signer.sign_to_vec().unwrap());

        let signature_block = format!(
            "<ds:Signature xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\
{signed_info}\
<ds:SignatureValue>{signature_b64}</ds:SignatureValue>\
</ds:Signature>"
        );

        let close = xml
            .rfind("</samlp:Response>")
            .or_else(|| xml.rfind("</Response>"))
            .unwrap();
        format!("{}{}{}", &xml[..close], signature_block, &xml[close..])
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{generate_idp_keypair, sign_document};
    use super::*;

    const UNSIGNED_RESPONSE: &str = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp1" Version="2.0"><saml:Issuer>https://idp.example.com</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status></samlp:Response>"#;

    #[test]
    fn test_signed_document_verifies() {
        let (key, cert_pem) = generate_idp_keypair();
        let signed = sign_document(UNSIGNED_RESPONSE, &key);
        verify_enveloped_signature(&signed, &cert_pem).unwrap();
    }

    #[test]
    fn test_unsigned_document_rejected() {
        let (_, cert_pem) = generate_idp_keypair();
        let err = verify_enveloped_signature(UNSIGNED_RESPONSE, &cert_pem).unwrap_err();
        assert!(matches!(err, SsoError::InvalidAssertion(_)));
    }

    #[test]
    fn test_tampered_content_rejected() {
        let (key, cert_pem) = generate_idp_keypair();
        let signed = sign_document(UNSIGNED_RESPONSE, &key);
        let tampered = signed.replace("idp.example.com", "evil.example.com");
        let err = verify_enveloped_signature(&tampered, &cert_pem).unwrap_err();
        assert!(matches!(err, SsoError::InvalidAssertion(_)));
    }

    #[test]
    fn test_wrong_certificate_rejected() {
        let (key, _) = generate_idp_keypair();
        let (_, other_cert) = generate_idp_keypair();
        let signed = sign_document(UNSIGNED_RESPONSE, &key);
        let err = verify_enveloped_signature(&signed, &other_cert).unwrap_err();
        assert!(matches!(err, SsoError::InvalidAssertion(_)));
    }

    #[test]
    fn test_tampered_signature_value_rejected() {
        let (key, cert_pem) = generate_idp_keypair();
        let signed = sign_document(UNSIGNED_RESPONSE, &key);
        let info = extract_signature_info(&signed).unwrap().unwrap();
        let forged = BASE64.encode(vec![0u8; 256]);
        let tampered = signed.replace(&info.signature_value, &forged);
        let err = verify_enveloped_signature(&tampered, &cert_pem).unwrap_err();
        assert!(matches!(err, SsoError::InvalidAssertion(_)));
    }

    #[test]
    fn test_extract_signature_info_prefixed() {
        let (key, _) = generate_idp_keypair();
        let signed = sign_document(UNSIGNED_RESPONSE, &key);
        let info = extract_signature_info(&signed).unwrap().unwrap();
        assert!(info.signed_info.starts_with("<ds:SignedInfo"));
        assert!(info.signed_info.ends_with("</ds:SignedInfo>"));
        assert_eq!(info.signature_method, RSA_SHA256);
    }

    #[test]
    fn test_remove_signature_restores_original() {
        let (key, _) = generate_idp_keypair();
        let signed = sign_document(UNSIGNED_RESPONSE, &key);
        assert_eq!(remove_signature_element(&signed), UNSIGNED_RESPONSE);
    }

    #[test]
    fn test_parse_certificate_without_armor() {
        let (_, cert_pem) = generate_idp_keypair();
        let stripped: String = cert_pem
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect();
        parse_certificate(&stripped).unwrap();
    }

    #[test]
    fn test_unsupported_algorithm_rejected() {
        assert!(signature_digest("http://www.w3.org/2001/04/xmldsig-more#dsa-sha1").is_err());
    }

    #[test]
    fn test_redirect_payload_signature_roundtrip() {
        let (key, cert_pem) = generate_idp_keypair();
        let payload = "SAMLRequest=abc&RelayState=xyz&SigAlg=alg";
        let sig_b64 = sign_redirect_payload(payload, &key).unwrap();

        let cert = parse_certificate(&cert_pem).unwrap();
        let public_key = cert.public_key().unwrap();
        let mut verifier = Verifier::new(MessageDigest::sha256(), &public_key).unwrap();
        verifier.update(payload.as_bytes()).unwrap();
        assert!(verifier.verify(&BASE64.decode(sig_b64).unwrap()).unwrap());
    }
}
