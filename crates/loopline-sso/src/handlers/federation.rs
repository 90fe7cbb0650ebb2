//! Handlers for the user-facing federated login flow.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
    Form, Json,
};
use tracing::instrument;
use uuid::Uuid;

use crate::error::SsoResult;
use crate::models::{
    LoginCompletedResponse, LoginQuery, LogoutResponse, OidcCallbackQuery, SamlCallbackForm,
};
use crate::router::SsoState;

/// Start a federated login: redirect the browser to the organization's IdP.
#[utoipa::path(
    get,
    path = "/sso/{config_id}/login",
    params(
        ("config_id" = Uuid, Path, description = "SSO configuration id"),
        LoginQuery,
    ),
    responses(
        (status = 307, description = "Redirect to the identity provider"),
        (status = 403, description = "Configuration disabled"),
        (status = 404, description = "Configuration not found"),
    ),
    tag = "SSO"
)]
#[instrument(skip(state, query))]
pub async fn login(
    State(state): State<SsoState>,
    Path(config_id): Path<Uuid>,
    Query(query): Query<LoginQuery>,
) -> SsoResult<impl IntoResponse> {
    let redirect = state
        .auth_flow
        .initiate_login(
            config_id,
            query.return_to.as_deref(),
            query.login_hint.as_deref(),
        )
        .await?;

    tracing::info!(
        %config_id,
        provider_kind = %redirect.provider_kind,
        "Initiated federated login"
    );

    Ok(Redirect::temporary(&redirect.redirect_url))
}

/// Assertion consumer endpoint: the IdP posts the SAML response here.
#[utoipa::path(
    post,
    path = "/sso/{config_id}/saml/callback",
    params(
        ("config_id" = Uuid, Path, description = "SSO configuration id"),
    ),
    responses(
        (status = 200, description = "Login completed", body = LoginCompletedResponse),
        (status = 401, description = "Assertion rejected"),
        (status = 403, description = "Domain not allowed or provisioning disabled"),
    ),
    tag = "SSO"
)]
#[instrument(skip(state, form))]
pub async fn saml_callback(
    State(state): State<SsoState>,
    Path(config_id): Path<Uuid>,
    Form(form): Form<SamlCallbackForm>,
) -> SsoResult<Json<LoginCompletedResponse>> {
    let login = state
        .auth_flow
        .handle_saml_callback(config_id, &form.saml_response)
        .await?;

    tracing::info!(
        %config_id,
        user_id = %login.user.id,
        session_id = %login.session.id,
        newly_provisioned = login.newly_provisioned,
        "SAML login completed"
    );

    Ok(Json(login.into()))
}

/// OIDC redirect endpoint: the IdP sends the authorization code here.
#[utoipa::path(
    get,
    path = "/sso/{config_id}/oidc/callback",
    params(
        ("config_id" = Uuid, Path, description = "SSO configuration id"),
        OidcCallbackQuery,
    ),
    responses(
        (status = 200, description = "Login completed", body = LoginCompletedResponse),
        (status = 401, description = "State invalid, expired, or already used"),
        (status = 403, description = "Domain not allowed or provisioning disabled"),
        (status = 502, description = "IdP request failed"),
        (status = 504, description = "IdP request timed out"),
    ),
    tag = "SSO"
)]
#[instrument(skip(state, query))]
pub async fn oidc_callback(
    State(state): State<SsoState>,
    Path(config_id): Path<Uuid>,
    Query(query): Query<OidcCallbackQuery>,
) -> SsoResult<Json<LoginCompletedResponse>> {
    let login = state
        .auth_flow
        .handle_oidc_callback(config_id, query.into())
        .await?;

    tracing::info!(
        %config_id,
        user_id = %login.user.id,
        session_id = %login.session.id,
        newly_provisioned = login.newly_provisioned,
        "OIDC login completed"
    );

    Ok(Json(login.into()))
}

/// Log out an SSO session. The local session is always revoked; the response
/// carries a provider logout URL when the IdP supports single logout.
#[utoipa::path(
    post,
    path = "/sso/logout/{session_id}",
    params(
        ("session_id" = Uuid, Path, description = "SSO session id"),
    ),
    responses(
        (status = 200, description = "Session revoked", body = LogoutResponse),
        (status = 404, description = "Session not found"),
    ),
    tag = "SSO"
)]
#[instrument(skip(state))]
pub async fn logout(
    State(state): State<SsoState>,
    Path(session_id): Path<Uuid>,
) -> SsoResult<Json<LogoutResponse>> {
    let outcome = state.auth_flow.initiate_logout(session_id).await?;

    tracing::info!(%session_id, "SSO session logged out");

    Ok(Json(outcome.into()))
}
