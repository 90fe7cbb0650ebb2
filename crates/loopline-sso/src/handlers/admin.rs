//! Admin handlers for SSO configuration management.
//!
//! Organization scope comes from the authentication middleware via
//! `Extension<OrgId>`; every operation is bounded to that organization.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use loopline_core::OrgId;
use tracing::instrument;
use uuid::Uuid;

use crate::error::SsoResult;
use crate::models::{
    CreateSsoConfigurationRequest, SsoConfigurationResponse, ToggleSsoConfigurationRequest,
    UpdateSsoConfigurationRequest,
};
use crate::router::SsoState;

/// List the organization's SSO configurations.
#[utoipa::path(
    get,
    path = "/admin/sso/configurations",
    responses(
        (status = 200, description = "List of configurations", body = [SsoConfigurationResponse]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized"),
    ),
    security(("bearerAuth" = [])),
    tag = "SSO Admin"
)]
#[instrument(skip(state))]
pub async fn list_configurations(
    State(state): State<SsoState>,
    Extension(org): Extension<OrgId>,
) -> SsoResult<Json<Vec<SsoConfigurationResponse>>> {
    let configs = state
        .config_store
        .list_for_organization(*org.as_uuid())
        .await?;

    Ok(Json(
        configs.into_iter().map(SsoConfigurationResponse::from).collect(),
    ))
}

/// Create an SSO configuration.
#[utoipa::path(
    post,
    path = "/admin/sso/configurations",
    request_body = CreateSsoConfigurationRequest,
    responses(
        (status = 201, description = "Configuration created", body = SsoConfigurationResponse),
        (status = 400, description = "Invalid configuration"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized"),
    ),
    security(("bearerAuth" = [])),
    tag = "SSO Admin"
)]
#[instrument(skip(state, req))]
pub async fn create_configuration(
    State(state): State<SsoState>,
    Extension(org): Extension<OrgId>,
    Json(req): Json<CreateSsoConfigurationRequest>,
) -> SsoResult<impl IntoResponse> {
    let org_id = *org.as_uuid();

    tracing::info!(
        %org_id,
        provider_kind = %req.provider_kind,
        "Admin creating SSO configuration"
    );

    let config = state.config_store.create(org_id, req.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(SsoConfigurationResponse::from(config)),
    ))
}

/// Get a single SSO configuration.
#[utoipa::path(
    get,
    path = "/admin/sso/configurations/{config_id}",
    params(
        ("config_id" = Uuid, Path, description = "SSO configuration id"),
    ),
    responses(
        (status = 200, description = "Configuration", body = SsoConfigurationResponse),
        (status = 404, description = "Configuration not found"),
    ),
    security(("bearerAuth" = [])),
    tag = "SSO Admin"
)]
#[instrument(skip(state))]
pub async fn get_configuration(
    State(state): State<SsoState>,
    Extension(org): Extension<OrgId>,
    Path(config_id): Path<Uuid>,
) -> SsoResult<Json<SsoConfigurationResponse>> {
    let config = state.config_store.get(*org.as_uuid(), config_id).await?;
    Ok(Json(config.into()))
}

/// Update an SSO configuration. The provider kind cannot change.
#[utoipa::path(
    put,
    path = "/admin/sso/configurations/{config_id}",
    params(
        ("config_id" = Uuid, Path, description = "SSO configuration id"),
    ),
    request_body = UpdateSsoConfigurationRequest,
    responses(
        (status = 200, description = "Configuration updated", body = SsoConfigurationResponse),
        (status = 400, description = "Invalid update or immutable field"),
        (status = 404, description = "Configuration not found"),
    ),
    security(("bearerAuth" = [])),
    tag = "SSO Admin"
)]
#[instrument(skip(state, req))]
pub async fn update_configuration(
    State(state): State<SsoState>,
    Extension(org): Extension<OrgId>,
    Path(config_id): Path<Uuid>,
    Json(req): Json<UpdateSsoConfigurationRequest>,
) -> SsoResult<Json<SsoConfigurationResponse>> {
    let org_id = *org.as_uuid();

    tracing::info!(%org_id, %config_id, "Admin updating SSO configuration");

    let config = state
        .config_store
        .update(org_id, config_id, req.into())
        .await?;

    Ok(Json(config.into()))
}

/// Enable or disable an SSO configuration.
#[utoipa::path(
    post,
    path = "/admin/sso/configurations/{config_id}/toggle",
    params(
        ("config_id" = Uuid, Path, description = "SSO configuration id"),
    ),
    request_body = ToggleSsoConfigurationRequest,
    responses(
        (status = 200, description = "Configuration toggled", body = SsoConfigurationResponse),
        (status = 404, description = "Configuration not found"),
    ),
    security(("bearerAuth" = [])),
    tag = "SSO Admin"
)]
#[instrument(skip(state))]
pub async fn toggle_configuration(
    State(state): State<SsoState>,
    Extension(org): Extension<OrgId>,
    Path(config_id): Path<Uuid>,
    Json(req): Json<ToggleSsoConfigurationRequest>,
) -> SsoResult<Json<SsoConfigurationResponse>> {
    let org_id = *org.as_uuid();

    tracing::info!(%org_id, %config_id, enabled = req.enabled, "Admin toggling SSO configuration");

    let config = state
        .config_store
        .set_enabled(org_id, config_id, req.enabled)
        .await?;

    Ok(Json(config.into()))
}
