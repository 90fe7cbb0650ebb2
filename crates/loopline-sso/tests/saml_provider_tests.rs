//! SAML provider-client integration tests.
//!
//! Builds clients from configuration rows (including the encrypted SP
//! signing key) and validates responses signed the way an IdP signs them.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{Duration, Utc};
use loopline_db::models::SsoConfiguration;
use loopline_sso::saml::SamlProviderClient;
use loopline_sso::services::{generate_master_key, CredentialCipher};
use loopline_sso::SsoError;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::x509::{X509NameBuilder, X509};

const BASE_URL: &str = "https://app.loopline.test";

fn generate_keypair(cn: &str) -> (PKey<Private>, String) {
    let rsa = Rsa::generate(2048).unwrap();
    let key = PKey::from_rsa(rsa).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
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

    let pem = String::from_utf8(builder.build().to_pem().unwrap()).unwrap();
    (key, pem)
}

/// Append an enveloped signature to a response document, the way an IdP
/// does: SHA-256 digest over the unsigned document, RSA-SHA256 over the
/// exact `SignedInfo` bytes.
fn sign_response(xml: &str, key: &PKey<Private>) -> String {
    let digest = openssl::hash::hash(MessageDigest::sha256(), xml.as_bytes()).unwrap();
    let digest_b64 = BASE64.encode(digest);

    let signed_info = format!(
        "<ds:SignedInfo xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\
<ds:CanonicalizationMethod Algorithm=\"http://www.w3.org/2001/10/xml-exc-c14n#\"/>\
<ds:SignatureMethod Algorithm=\"http://www.w3.org/2001/04/xmldsig-more#rsa-sha256\"/>\
<ds:Reference URI=\"#_resp\">\
<ds:Transforms>\
<ds:Transform Algorithm=\"http://www.w3.org/2000/09/xmldsig#enveloped-signature\"/>\
</ds:Transforms>\
<ds:DigestMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#sha256\"/>\
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

    let close = xml.rfind("</samlp:Response>").unwrap();
    format!("{}{}{}", &xml[..close], signature_block, &xml[close..])
}

fn response_for(client: &SamlProviderClient, name_id: &str) -> String {
    let not_before = (Utc::now() - Duration::minutes(5)).format("%Y-%m-%dT%H:%M:%SZ");
    let not_after = (Utc::now() + Duration::minutes(5)).format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp" Version="2.0"><saml:Issuer>https://idp.example.com</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status><saml:Assertion ID="_a1"><saml:Subject><saml:NameID>{name_id}</saml:NameID></saml:Subject><saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_after}"><saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction></saml:Conditions><saml:AuthnStatement SessionIndex="_session1"/><saml:AttributeStatement><saml:Attribute Name="email"><saml:AttributeValue>{name_id}</saml:AttributeValue></saml:Attribute><saml:Attribute Name="department"><saml:AttributeValue>Platform</saml:AttributeValue></saml:Attribute></saml:AttributeStatement></saml:Assertion></samlp:Response>"#,
        audience = client.entity_id(),
    )
}

fn saml_config(idp_cert: String) -> SsoConfiguration {
    let mut config = SsoConfiguration::default_saml_for_test();
    config.saml_idp_certificate = Some(idp_cert);
    config.saml_idp_slo_url = Some("https://idp.example.com/slo".to_string());
    config.saml_sp_private_key_encrypted = None;
    config
}

#[test]
fn test_build_and_validate_signed_response() {
    let (idp_key, idp_cert) = generate_keypair("idp.example.com");
    let cipher = CredentialCipher::new(generate_master_key());
    let config = saml_config(idp_cert);

    let client = SamlProviderClient::build(&config, &cipher, BASE_URL).expect("client build");
    assert_eq!(
        client.acs_url(),
        format!("{BASE_URL}/sso/{}/saml/callback", config.id)
    );

    let raw = BASE64.encode(sign_response(&response_for(&client, "alice@acme.test"), &idp_key));
    let profile = client.validate_response(&raw).expect("validation");

    assert_eq!(profile.name_id, "alice@acme.test");
    assert_eq!(profile.session_index.as_deref(), Some("_session1"));
    assert_eq!(
        profile.attributes.get("department"),
        Some(&vec!["Platform".to_string()])
    );
}

#[test]
fn test_build_decrypts_sp_key_and_signs_requests() {
    let (_, idp_cert) = generate_keypair("idp.example.com");
    let (sp_key, _) = generate_keypair("sp.loopline.test");
    let cipher = CredentialCipher::new(generate_master_key());

    let mut config = saml_config(idp_cert);
    let sp_key_pem = String::from_utf8(sp_key.private_key_to_pem_pkcs8().unwrap()).unwrap();
    config.saml_sp_private_key_encrypted =
        Some(cipher.encrypt(config.org_id, &sp_key_pem).unwrap());

    let client = SamlProviderClient::build(&config, &cipher, BASE_URL).expect("client build");
    let login_url = client.build_login_url(None).expect("login url");

    assert!(login_url.contains("SAMLRequest="));
    assert!(login_url.contains("SigAlg="));
    assert!(login_url.contains("&Signature="));
}

#[test]
fn test_build_rejects_sp_key_from_other_org() {
    let (_, idp_cert) = generate_keypair("idp.example.com");
    let (sp_key, _) = generate_keypair("sp.loopline.test");
    let cipher = CredentialCipher::new(generate_master_key());

    let mut config = saml_config(idp_cert);
    let sp_key_pem = String::from_utf8(sp_key.private_key_to_pem_pkcs8().unwrap()).unwrap();
    config.saml_sp_private_key_encrypted =
        Some(cipher.encrypt(uuid::Uuid::new_v4(), &sp_key_pem).unwrap());

    let err = SamlProviderClient::build(&config, &cipher, BASE_URL).unwrap_err();
    assert!(matches!(err, SsoError::DecryptionFailed(_)));
}

#[test]
fn test_validate_rejects_response_signed_by_other_idp() {
    let (_, idp_cert) = generate_keypair("idp.example.com");
    let (rogue_key, _) = generate_keypair("rogue.example.com");
    let cipher = CredentialCipher::new(generate_master_key());
    let config = saml_config(idp_cert);

    let client = SamlProviderClient::build(&config, &cipher, BASE_URL).expect("client build");
    let raw = BASE64.encode(sign_response(&response_for(&client, "alice@acme.test"), &rogue_key));

    let err = client.validate_response(&raw).unwrap_err();
    assert!(matches!(err, SsoError::InvalidAssertion(_)));
}

#[test]
fn test_build_rejects_missing_certificate() {
    let cipher = CredentialCipher::new(generate_master_key());
    let mut config = SsoConfiguration::default_saml_for_test();
    config.saml_idp_certificate = None;

    let err = SamlProviderClient::build(&config, &cipher, BASE_URL).unwrap_err();
    assert!(matches!(err, SsoError::InvalidConfiguration(_)));
}
