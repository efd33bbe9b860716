// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role management endpoints (admin only).
//!
//! Changes go straight to the role store. Permission checks read through the
//! role cache, so a grant or revoke takes effect for the affected user within
//! one cache TTL.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Authenticated, Role, UserId},
    error::ApiError,
    state::AppState,
};

/// Request body for granting or revoking a role.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleRequest {
    /// Role name, case-insensitive (e.g. `admin`).
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleListResponse {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleCreatedResponse {
    pub created: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleDeletedResponse {
    /// `false` if the user did not hold the role.
    pub deleted: bool,
}

fn target_user(raw: String) -> Result<UserId, ApiError> {
    UserId::new(raw).ok_or_else(|| ApiError::bad_request("userID must not be empty"))
}

fn requested_role(payload: Result<Json<RoleRequest>, JsonRejection>) -> Result<Role, ApiError> {
    let Json(request) = payload?;
    Role::parse(&request.role).ok_or_else(|| ApiError::bad_request("role must not be empty"))
}

/// List a user's roles, read from the store without caching.
#[utoipa::path(
    get,
    path = "/v1/users/{userID}/roles",
    tag = "Roles",
    security(("bearer" = [])),
    params(("userID" = String, Path, description = "Target user")),
    responses(
        (status = 200, description = "Current roles", body = RoleListResponse),
        (status = 403, description = "Caller is not an admin"),
        (status = 503, description = "Role store unavailable"),
    )
)]
pub async fn list_roles(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<RoleListResponse>, ApiError> {
    let user_id = target_user(user_id)?;
    let roles = state.roles.roles_for(&user_id).await?;

    Ok(Json(RoleListResponse {
        roles: roles.iter().map(|role| role.to_string()).collect(),
        user_id,
    }))
}

/// Grant a role. Granting a role the user already holds is a no-op.
#[utoipa::path(
    post,
    path = "/v1/users/{userID}/roles",
    tag = "Roles",
    security(("bearer" = [])),
    params(("userID" = String, Path, description = "Target user")),
    request_body = RoleRequest,
    responses(
        (status = 201, description = "Role granted", body = RoleCreatedResponse),
        (status = 400, description = "Malformed request body"),
        (status = 403, description = "Caller is not an admin"),
        (status = 503, description = "Role store unavailable"),
    )
)]
pub async fn grant_role(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
    Path(user_id): Path<String>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RoleCreatedResponse>), ApiError> {
    let user_id = target_user(user_id)?;
    let role = requested_role(payload)?;

    state.roles.grant_role(&user_id, &role).await?;
    tracing::info!(admin = %admin, user_id = %user_id, role = %role, "Role granted");

    Ok((StatusCode::CREATED, Json(RoleCreatedResponse { created: true })))
}

/// Revoke a role.
#[utoipa::path(
    delete,
    path = "/v1/users/{userID}/roles",
    tag = "Roles",
    security(("bearer" = [])),
    params(("userID" = String, Path, description = "Target user")),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Role revoked", body = RoleDeletedResponse),
        (status = 400, description = "Malformed request body"),
        (status = 403, description = "Caller is not an admin"),
        (status = 503, description = "Role store unavailable"),
    )
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    Authenticated(admin): Authenticated,
    Path(user_id): Path<String>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<Json<RoleDeletedResponse>, ApiError> {
    let user_id = target_user(user_id)?;
    let role = requested_role(payload)?;

    let deleted = state.roles.revoke_role(&user_id, &role).await?;
    tracing::info!(admin = %admin, user_id = %user_id, role = %role, deleted, "Role revoked");

    Ok(Json(RoleDeletedResponse { deleted }))
}
