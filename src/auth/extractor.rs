// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the resolved principal.
//!
//! ```rust,ignore
//! async fn whoami(Authenticated(user_id): Authenticated) -> impl IntoResponse {
//!     // user_id is the verified caller
//! }
//! ```

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::middleware::principal_of;
use super::{AuthError, Principal, UserId};

/// The caller, anonymous or not.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentPrincipal(principal_of(&parts.extensions)))
    }
}

/// A logged-in caller. Rejects anonymous requests with `401`.
#[derive(Debug, Clone)]
pub struct Authenticated(pub UserId);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match principal_of(&parts.extensions) {
            Principal::User(user_id) => Ok(Authenticated(user_id)),
            Principal::Anonymous => Err(AuthError::AuthenticationRequired),
        }
    }
}
