//! OIDC provider-client integration tests against a mock IdP.
//!
//! Covers issuer discovery, authorization URL generation, the code exchange
//! and userinfo retrieval, all over a local wiremock server.

use loopline_db::models::SsoConfiguration;
use loopline_sso::services::{generate_master_key, CredentialCipher, DiscoveryService};
use loopline_sso::services::oidc_client::OidcProviderClient;
use loopline_sso::SsoError;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_SECRET: &str = "test-client-secret";

struct Fixture {
    server: MockServer,
    cipher: Arc<CredentialCipher>,
    config: SsoConfiguration,
}

async fn setup(end_session: bool) -> Fixture {
    let server = MockServer::start().await;
    let issuer = server.uri();

    let mut metadata = json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
        "jwks_uri": format!("{issuer}/jwks"),
        "response_types_supported": ["code"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"]
    });
    if end_session {
        metadata["end_session_endpoint"] = json!(format!("{issuer}/logout"));
    }

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(metadata))
        .mount(&server)
        .await;

    // Discovery also fetches the JWKS document eagerly.
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [] })))
        .mount(&server)
        .await;

    let cipher = Arc::new(CredentialCipher::new(generate_master_key()));
    let mut config = SsoConfiguration::default_oidc_for_test();
    config.oidc_issuer_url = Some(issuer);
    config.oidc_redirect_uri = None;
    config.oidc_client_secret_encrypted = Some(
        cipher
            .encrypt(config.org_id, CLIENT_SECRET)
            .expect("encrypt secret"),
    );

    Fixture {
        server,
        cipher,
        config,
    }
}

async fn build_client(fixture: &Fixture) -> OidcProviderClient {
    OidcProviderClient::build(
        &fixture.config,
        &fixture.cipher,
        &DiscoveryService::new(),
        "https://app.loopline.test",
    )
    .await
    .expect("client build")
}

#[tokio::test]
async fn test_discovery_captures_endpoints() {
    let fixture = setup(true).await;
    let endpoints = DiscoveryService::new()
        .discover(&fixture.server.uri())
        .await
        .expect("discovery");

    assert_eq!(
        endpoints.authorization_endpoint,
        format!("{}/authorize", fixture.server.uri())
    );
    assert_eq!(
        endpoints.end_session_endpoint.as_deref(),
        Some(format!("{}/logout", fixture.server.uri()).as_str())
    );
}

#[tokio::test]
async fn test_discovery_without_end_session_endpoint() {
    let fixture = setup(false).await;
    let endpoints = DiscoveryService::new()
        .discover(&fixture.server.uri())
        .await
        .expect("discovery");
    assert!(endpoints.end_session_endpoint.is_none());
}

#[tokio::test]
async fn test_redirect_uri_falls_back_to_callback_route() {
    let fixture = setup(false).await;
    let client = build_client(&fixture).await;

    assert_eq!(
        client.redirect_uri(),
        format!(
            "https://app.loopline.test/sso/{}/oidc/callback",
            fixture.config.id
        )
    );
}

#[tokio::test]
async fn test_authorization_url_points_at_idp() {
    let fixture = setup(false).await;
    let client = build_client(&fixture).await;

    let url = client
        .build_authorization_url("state-1", "challenge-1", Some("user@acme.test"))
        .expect("auth url");

    assert!(url.as_str().starts_with(&format!("{}/authorize?", fixture.server.uri())));
    let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(query.get("code_challenge_method").map(String::as_str), Some("S256"));
    assert_eq!(query.get("login_hint").map(String::as_str), Some("user@acme.test"));
}

#[tokio::test]
async fn test_code_exchange_success() {
    let fixture = setup(false).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code_verifier=verifier-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-123",
            "token_type": "Bearer",
            "id_token": "idt-456",
            "expires_in": 3600
        })))
        .mount(&fixture.server)
        .await;

    let client = build_client(&fixture).await;
    let tokens = client
        .exchange_code("code-1", "verifier-1")
        .await
        .expect("exchange");

    assert_eq!(tokens.access_token, "at-123");
    assert_eq!(tokens.id_token.as_deref(), Some("idt-456"));
    assert_eq!(tokens.expires_in, Some(3600));
}

#[tokio::test]
async fn test_code_exchange_failure_is_opaque() {
    let fixture = setup(false).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "sensitive-idp-detail"
        })))
        .mount(&fixture.server)
        .await;

    let client = build_client(&fixture).await;
    let err = client.exchange_code("bad-code", "verifier").await.unwrap_err();

    match err {
        SsoError::UpstreamError(message) => {
            // The IdP response body must not leak to callers.
            assert!(!message.contains("sensitive-idp-detail"));
            assert!(message.contains("400"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_userinfo_returns_claims() {
    let fixture = setup(false).await;

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer at-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "user-1",
            "email": "alice@acme.test",
            "given_name": "Alice",
            "name": "Alice Ng"
        })))
        .mount(&fixture.server)
        .await;

    let client = build_client(&fixture).await;
    let claims = client.fetch_user_info("at-123").await.expect("userinfo");

    assert_eq!(claims.get("email"), Some(&json!("alice@acme.test")));
    assert_eq!(claims.get("name"), Some(&json!("Alice Ng")));
}

#[tokio::test]
async fn test_end_session_url_from_discovery() {
    let fixture = setup(true).await;
    let client = build_client(&fixture).await;

    let url = client
        .build_end_session_url(Some("idt-456"), None)
        .expect("end session url");
    assert!(url.as_str().starts_with(&format!("{}/logout?", fixture.server.uri())));
    assert!(url.as_str().contains("id_token_hint=idt-456"));
}

#[tokio::test]
async fn test_build_fails_without_secret() {
    let fixture = setup(false).await;
    let mut config = fixture.config.clone();
    config.oidc_client_secret_encrypted = None;

    let err = OidcProviderClient::build(
        &config,
        &fixture.cipher,
        &DiscoveryService::new(),
        "https://app.loopline.test",
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SsoError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn test_build_fails_with_wrong_org_key() {
    let fixture = setup(false).await;
    let mut config = fixture.config.clone();
    // Ciphertext produced under a different organization's derived key.
    config.oidc_client_secret_encrypted = Some(
        fixture
            .cipher
            .encrypt(uuid::Uuid::new_v4(), CLIENT_SECRET)
            .expect("encrypt"),
    );

    let err = OidcProviderClient::build(
        &config,
        &fixture.cipher,
        &DiscoveryService::new(),
        "https://app.loopline.test",
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SsoError::DecryptionFailed(_)));
}
