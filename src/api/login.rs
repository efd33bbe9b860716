// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Registration and password login.

use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use super::tokens::TokenResponse;
use crate::{
    auth::{AuthError, DeviceId, Principal},
    error::ApiError,
    state::AppState,
};

/// Request body for POST /v1/users and POST /v1/login
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Login name, matched case-insensitively.
    pub login: String,
    /// At least 8 characters when registering.
    pub password: String,
    /// Device the session is started on.
    #[serde(rename = "deviceID")]
    pub device_id: String,
}

/// Register a new user and start a session for it.
#[utoipa::path(
    post,
    path = "/v1/users",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 201, description = "User created", body = TokenResponse),
        (status = 400, description = "Missing login, short password or malformed body"),
        (status = 409, description = "Login already registered"),
        (status = 503, description = "Store unavailable"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let Json(request) = payload?;
    let device_id = DeviceId::parse(request.device_id)?;

    let user_id = state
        .credentials
        .register(&request.login, &request.password)
        .await?;
    let tokens = state
        .sessions
        .login(&Principal::user(user_id.clone()), &device_id)
        .await?;
    Ok((StatusCode::CREATED, Json(TokenResponse::new(user_id, tokens))))
}

/// Check a login and password and start a session on the given device.
///
/// A previous session on the same device is replaced.
#[utoipa::path(
    post,
    path = "/v1/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "Invalid login or password"),
        (status = 503, description = "Store unavailable"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    let device_id = DeviceId::parse(request.device_id)?;

    let principal = state
        .credentials
        .verify(&request.login, &request.password)
        .await?;
    let tokens = state.sessions.login(&principal, &device_id).await?;
    let user_id = principal.user_id().cloned().ok_or(AuthError::InvalidIdentity)?;
    Ok(Json(TokenResponse::new(user_id, tokens)))
}
