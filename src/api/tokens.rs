// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token refresh endpoint.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{DeviceId, TokenPair, UserId},
    error::ApiError,
    state::AppState,
};

/// Request body for POST /v1/refresh
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    /// Refresh token from the last token response.
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    /// Device the session was started on.
    #[serde(rename = "deviceID")]
    pub device_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenUser {
    #[serde(rename = "userID")]
    pub user_id: UserId,
}

/// Token pair plus the user it was issued for.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub tokens: TokenPair,
    pub user: TokenUser,
}

impl TokenResponse {
    pub fn new(user_id: UserId, tokens: TokenPair) -> Self {
        Self {
            tokens,
            user: TokenUser { user_id },
        }
    }
}

/// Exchange a refresh token for a new token pair.
///
/// The presented refresh token stops working once this call succeeds.
#[utoipa::path(
    post,
    path = "/v1/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "Invalid refresh token or unknown session"),
        (status = 503, description = "Session store unavailable"),
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    let device_id = DeviceId::parse(request.device_id)?;

    let (user_id, tokens) = state.sessions.refresh(&request.refresh_token, &device_id).await?;
    Ok(Json(TokenResponse::new(user_id, tokens)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::storage::MemoryStore;
    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (axum::Router, AppState) {
        let state = AppState::in_memory(b"refresh-endpoint", Arc::new(MemoryStore::new()));
        (crate::api::router(state.clone(), Duration::from_secs(5)), state)
    }

    async fn post_refresh(router: &axum::Router, body: String) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/refresh")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    async fn login(state: &AppState, user: &str, device: &str) -> TokenPair {
        let principal = Principal::user(UserId::new(user).unwrap());
        state
            .sessions
            .login(&principal, &DeviceId::parse(device).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn refresh_rotates_tokens() {
        let (router, state) = app();
        let first = login(&state, "alice", "phone").await;

        let body = serde_json::json!({"refreshToken": first.refresh_token, "deviceID": "phone"});
        let (status, json) = post_refresh(&router, body.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["userID"], "alice");
        assert!(json["tokens"]["accessToken"].is_string());
        assert!(json["tokens"]["refreshTokenExpiresAt"].is_i64());

        let (status, json) = post_refresh(&router, body.to_string()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error_code"], "session_not_found");
    }

    #[tokio::test]
    async fn wrong_device_looks_like_replaced_token() {
        let (router, state) = app();

        let pair = login(&state, "alice", "phone").await;
        let wrong_device = serde_json::json!({"refreshToken": pair.refresh_token, "deviceID": "laptop"});
        let (status_a, body_a) = post_refresh(&router, wrong_device.to_string()).await;

        let replaced = login(&state, "bob", "phone").await;
        login(&state, "bob", "phone").await;
        let stale = serde_json::json!({"refreshToken": replaced.refresh_token, "deviceID": "phone"});
        let (status_b, body_b) = post_refresh(&router, stale.to_string()).await;

        assert_eq!(status_a, StatusCode::UNAUTHORIZED);
        assert_eq!((status_a, body_a), (status_b, body_b));
    }

    #[tokio::test]
    async fn access_token_is_not_a_refresh_token() {
        let (router, state) = app();
        let pair = login(&state, "alice", "phone").await;

        let body = serde_json::json!({"refreshToken": pair.access_token, "deviceID": "phone"});
        let (status, json) = post_refresh(&router, body.to_string()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error_code"], "invalid_token");
    }

    #[tokio::test]
    async fn bad_bodies_are_400() {
        let (router, _) = app();

        let (status, json) = post_refresh(&router, "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error_code"], "invalid_request");

        let blank_device = serde_json::json!({"refreshToken": "x", "deviceID": " "});
        let (status, _) = post_refresh(&router, blank_device.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
