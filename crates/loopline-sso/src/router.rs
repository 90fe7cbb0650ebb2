//! Router and shared state for the SSO API.

use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::handlers::{admin, federation};
use crate::services::{
    AuthFlow, ConfigStore, CredentialCipher, OidcClientCache, SamlClientCache,
};
use crate::state::{AuthStateStore, PostgresAuthStateStore};

/// Shared state for SSO handlers.
///
/// Organization scope is NOT stored here; it is extracted per request from
/// the authentication middleware via `Extension<loopline_core::OrgId>`.
#[derive(Clone)]
pub struct SsoState {
    /// Login/logout orchestration.
    pub auth_flow: AuthFlow,
    /// Admin configuration management.
    pub config_store: ConfigStore,
}

/// Configuration for the SSO router.
#[derive(Clone)]
pub struct SsoModuleConfig {
    /// Database connection pool.
    pub pool: PgPool,
    /// Master encryption key for stored credentials.
    pub master_key: [u8; 32],
    /// Public base URL of this deployment (e.g. `https://app.example.com`),
    /// used to build callback URLs the IdP redirects to.
    pub base_url: String,
}

impl SsoState {
    /// Create the shared state. The authorization state store defaults to
    /// Postgres so callbacks survive restarts and work across replicas.
    #[must_use]
    pub fn new(config: &SsoModuleConfig) -> Self {
        let state_store: Arc<dyn AuthStateStore> =
            Arc::new(PostgresAuthStateStore::new(config.pool.clone()));
        Self::with_state_store(config, state_store)
    }

    /// Create the shared state with an explicit authorization state store.
    #[must_use]
    pub fn with_state_store(
        config: &SsoModuleConfig,
        state_store: Arc<dyn AuthStateStore>,
    ) -> Self {
        let cipher = Arc::new(CredentialCipher::new(config.master_key));
        let saml_cache = SamlClientCache::new();
        let oidc_cache = OidcClientCache::new();

        let auth_flow = AuthFlow::new(
            config.pool.clone(),
            Arc::clone(&cipher),
            state_store,
            saml_cache.clone(),
            oidc_cache.clone(),
            config.base_url.clone(),
        );
        let config_store = ConfigStore::new(config.pool.clone(), cipher, saml_cache, oidc_cache);

        Self {
            auth_flow,
            config_store,
        }
    }
}

/// Admin routes for configuration management. Mount behind admin
/// authentication.
///
/// Routes:
/// - GET /configurations - List configurations
/// - POST /configurations - Create configuration
/// - GET /configurations/:config_id - Get configuration
/// - PUT /configurations/:config_id - Update configuration
/// - POST /configurations/:config_id/toggle - Enable/disable
pub fn admin_routes() -> Router<SsoState> {
    Router::new()
        .route("/configurations", get(admin::list_configurations))
        .route("/configurations", post(admin::create_configuration))
        .route("/configurations/:config_id", get(admin::get_configuration))
        .route(
            "/configurations/:config_id",
            put(admin::update_configuration),
        )
        .route(
            "/configurations/:config_id/toggle",
            post(admin::toggle_configuration),
        )
}

/// User-facing login and logout routes. Callback endpoints must be reachable
/// by the browser without prior authentication.
///
/// Routes:
/// - GET /:config_id/login - Initiate login
/// - POST /:config_id/saml/callback - SAML assertion consumer
/// - GET /:config_id/oidc/callback - OIDC redirect endpoint
/// - POST /logout/:session_id - Revoke a session
pub fn federation_routes() -> Router<SsoState> {
    Router::new()
        .route("/:config_id/login", get(federation::login))
        .route("/:config_id/saml/callback", post(federation::saml_callback))
        .route("/:config_id/oidc/callback", get(federation::oidc_callback))
        .route("/logout/:session_id", post(federation::logout))
}

/// Create the full SSO router.
pub fn create_sso_router(config: SsoModuleConfig) -> Router {
    let state = SsoState::new(&config);

    Router::new()
        .nest("/admin/sso", admin_routes())
        .nest("/sso", federation_routes())
        .with_state(state)
}
