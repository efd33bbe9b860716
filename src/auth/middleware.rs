// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal resolution middleware for Axum.
//!
//! Runs on every request, before routing:
//!
//! - no `Authorization` header: the request continues as [`Principal::Anonymous`]
//! - a header that is not `Bearer <token>`: `401 malformed_header`
//! - a token that fails verification: `401` with the verification error
//!
//! The resolved principal is stored in the request extensions under a private
//! type. Handlers read it through [`CurrentPrincipal`](super::CurrentPrincipal)
//! or [`Authenticated`](super::Authenticated), never by key.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/v1/users/me", get(me))
//!     .layer(axum::middleware::from_fn_with_state(issuer, resolve_principal));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, Extensions, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{AuthError, Principal, TokenIssuer};

/// Authorization scheme, matched case-insensitively.
const BEARER_SCHEME: &str = "bearer";

/// Principal attached by [`resolve_principal`].
#[derive(Debug, Clone)]
struct ResolvedPrincipal(Principal);

/// Authentication middleware function.
pub async fn resolve_principal(
    State(issuer): State<Arc<TokenIssuer>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(request.headers(), &issuer) {
        Ok(principal) => {
            request.extensions_mut().insert(ResolvedPrincipal(principal));
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, path = %request.uri().path(), "Rejected credentials");
            e.into_response()
        }
    }
}

/// Resolve the caller from request headers.
pub fn authenticate(headers: &HeaderMap, issuer: &TokenIssuer) -> Result<Principal, AuthError> {
    match bearer_token(headers)? {
        None => Ok(Principal::Anonymous),
        Some(token) => Ok(issuer.verify_access(token)?.principal()),
    }
}

/// Extract the bearer token.
///
/// An absent or empty header yields `Ok(None)`. Anything else that is not
/// exactly `<scheme> <token>` with a non-empty token is `MalformedHeader`.
/// The token itself may not contain whitespace.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;
    if value.is_empty() {
        return Ok(None);
    }

    let mut split = value.splitn(2, ' ');
    let scheme = split.next().unwrap_or_default();
    let token = split.next().unwrap_or_default();

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME)
        || token.is_empty()
        || token.contains(char::is_whitespace)
    {
        return Err(AuthError::MalformedHeader);
    }
    Ok(Some(token))
}

/// Principal resolved for this request. Anonymous if the middleware did not run.
pub fn principal_of(extensions: &Extensions) -> Principal {
    extensions
        .get::<ResolvedPrincipal>()
        .map(|resolved| resolved.0.clone())
        .unwrap_or_default()
}
