// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Refresh sessions and token rotation.
//!
//! ## Model
//!
//! A session binds `(user, device)` to the one refresh token currently valid
//! for that device. Logging in again on the same device replaces it.
//!
//! ## Refresh flow
//!
//! 1. Verify the presented refresh token. Any failure is `InvalidToken`.
//! 2. Find the session matching user (from the verified claims), device and
//!    token exactly. A mismatch in any of the three is `SessionNotFound`;
//!    an expired match is `SessionExpired`, which renders identically.
//! 3. Issue a new pair and swap it in only if the stored token is still the
//!    presented one. The old token stops working once that write commits.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AuthError, Principal, TokenIssuer, TokenPair, UserId};
use crate::storage::StoreResult;

/// Client-chosen device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// # Errors
    /// `InvalidRequest` if the id is empty.
    pub fn parse(raw: impl Into<String>) -> Result<Self, AuthError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(AuthError::InvalidRequest("device id is required".to_string()));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted refresh session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub refresh_token: String,
    /// Unix seconds
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Whether this session is the one identified by the exact triple.
    pub fn matches(&self, user_id: &UserId, device_id: &DeviceId, refresh_token: &str) -> bool {
        &self.user_id == user_id
            && &self.device_id == device_id
            && self.refresh_token == refresh_token
    }
}

/// Storage for refresh sessions, unique per `(user, device)`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The session for `(user_id, device_id)` if it currently holds
    /// `refresh_token`, expired or not.
    async fn find_session(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        refresh_token: &str,
    ) -> StoreResult<Option<Session>>;

    /// Insert or overwrite the session for `(session.user_id, session.device_id)`.
    async fn upsert_session(&self, session: &Session) -> StoreResult<()>;

    /// Atomically replace the session for `(session.user_id, session.device_id)`
    /// if it still holds `previous_token`.
    ///
    /// Returns `false`, leaving the store untouched, when it does not.
    async fn rotate_session(&self, previous_token: &str, session: &Session) -> StoreResult<bool>;
}

/// Joins the token issuer and the session store for login and refresh.
pub struct SessionManager {
    issuer: Arc<TokenIssuer>,
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(issuer: Arc<TokenIssuer>, store: Arc<dyn SessionStore>) -> Self {
        Self { issuer, store }
    }

    /// Start (or restart) a session for an already authenticated principal on
    /// one device.
    ///
    /// Any previous refresh token for the same device stops working.
    pub async fn login(
        &self,
        principal: &Principal,
        device_id: &DeviceId,
    ) -> Result<TokenPair, AuthError> {
        let user_id = principal.user_id().ok_or(AuthError::InvalidIdentity)?;
        let tokens = self.issuer.issue_tokens(principal)?;

        self.store
            .upsert_session(&session_for(user_id, device_id, &tokens))
            .await?;

        tracing::info!(user_id = %user_id, device_id = %device_id, "Session established");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair, rotating the stored session.
    ///
    /// Returns the user the tokens were issued for.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device_id: &DeviceId,
    ) -> Result<(UserId, TokenPair), AuthError> {
        let claims = self.issuer.verify_refresh(refresh_token).map_err(|e| {
            tracing::debug!(reason = %e, "Refresh token rejected");
            AuthError::InvalidToken
        })?;
        let principal = claims.principal();
        let user_id = principal.user_id().cloned().ok_or(AuthError::InvalidToken)?;

        let session = self
            .store
            .find_session(&user_id, device_id, refresh_token)
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        if session.is_expired_at(Utc::now().timestamp()) {
            return Err(AuthError::SessionExpired);
        }

        let tokens = self.issuer.issue_tokens(&principal)?;
        let rotated = self
            .store
            .rotate_session(refresh_token, &session_for(&user_id, device_id, &tokens))
            .await?;
        if !rotated {
            // Another refresh with the same token committed first.
            tracing::warn!(user_id = %user_id, device_id = %device_id, "Refresh token reused");
            return Err(AuthError::SessionNotFound);
        }

        tracing::info!(user_id = %user_id, device_id = %device_id, "Session rotated");
        Ok((user_id, tokens))
    }
}

fn session_for(user_id: &UserId, device_id: &DeviceId, tokens: &TokenPair) -> Session {
    Session {
        user_id: user_id.clone(),
        device_id: device_id.clone(),
        refresh_token: tokens.refresh_token.clone(),
        expires_at: tokens.refresh_token_expires_at,
    }
}
