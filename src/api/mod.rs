// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    auth::{middleware::resolve_principal, Permission, TokenPair},
    state::AppState,
};

pub mod health;
pub mod login;
pub mod roles;
pub mod tokens;
pub mod users;

/// Build the HTTP router.
///
/// Every request passes through principal resolution first; each route then
/// declares the permissions that admit it.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let gate = state.permissions.clone();

    let v1_routes = Router::new()
        .route(
            "/users",
            post(login::register).route_layer(gate.wrap(&[Permission::Any])),
        )
        .route(
            "/login",
            post(login::login).route_layer(gate.wrap(&[Permission::Any])),
        )
        .route(
            "/refresh",
            post(tokens::refresh).route_layer(gate.wrap(&[Permission::Any])),
        )
        .route(
            "/users/me",
            get(users::get_current_user).route_layer(gate.wrap(&[Permission::Member])),
        )
        .route(
            "/users/{userID}/roles",
            get(roles::list_roles)
                .post(roles::grant_role)
                .delete(roles::revoke_role)
                .route_layer(gate.wrap(&[Permission::Admin])),
        )
        .with_state(state.clone());

    Router::new()
        .nest("/v1", v1_routes)
        .route("/health/live", get(health::liveness))
        .route("/version", get(health::version))
        .route("/api-doc/openapi.json", get(openapi_json))
        .layer(from_fn_with_state(state.issuer.clone(), resolve_principal))
        .layer(timeout_layer(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Requests running past `timeout` are answered with `408`.
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        login::register,
        login::login,
        tokens::refresh,
        users::get_current_user,
        roles::list_roles,
        roles::grant_role,
        roles::revoke_role,
        health::liveness,
        health::version
    ),
    components(
        schemas(
            TokenPair,
            login::LoginRequest,
            tokens::RefreshRequest,
            tokens::TokenResponse,
            tokens::TokenUser,
            users::UserMeResponse,
            roles::RoleRequest,
            roles::RoleListResponse,
            roles::RoleCreatedResponse,
            roles::RoleDeletedResponse,
            health::HealthResponse,
            health::VersionResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Registration, login and token refresh"),
        (name = "Users", description = "Current user"),
        (name = "Roles", description = "Role management"),
        (name = "Health", description = "Liveness and version")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, Request},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState::in_memory(b"router-tests", Arc::new(MemoryStore::new()));
        router(state, Duration::from_secs(5))
    }

    async fn fetch(router: Router, uri: &str, auth: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        let response = router.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn public_routes_need_no_credentials() {
        let (status, body) = fetch(app(), "/health/live", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = fetch(app(), "/version", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], crate::config::VERSION);
    }

    #[tokio::test]
    async fn malformed_header_is_rejected_everywhere() {
        let (status, body) = fetch(app(), "/health/live", Some("Basic dXNlcjpwdw==")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "malformed_header");
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() {
        let (status, body) = fetch(app(), "/api-doc/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/v1/refresh"].is_object());
        assert!(body["paths"]["/v1/login"].is_object());
        assert!(body["paths"]["/v1/users/{userID}/roles"].is_object());
        assert!(body["components"]["securitySchemes"]["bearer"].is_object());
    }

    #[tokio::test]
    async fn slow_requests_time_out_with_408() {
        let slow = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(timeout_layer(Duration::from_millis(20)));

        let (status, _) = fetch(slow, "/slow", None).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    }
}
