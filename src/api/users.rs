// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::{Authenticated, UserId},
    error::ApiError,
    state::AppState,
};

/// Response for GET /v1/users/me
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Roles as seen by the permission checks, possibly up to one cache TTL old.
    pub roles: Vec<String>,
}

/// Get the current authenticated user's information.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Anonymous caller"),
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Authenticated(user_id): Authenticated,
) -> Result<Json<UserMeResponse>, ApiError> {
    let roles = state.permissions.role_cache().roles(&user_id).await?;
    Ok(Json(UserMeResponse {
        roles: roles.iter().map(|role| role.to_string()).collect(),
        user_id,
    }))
}
