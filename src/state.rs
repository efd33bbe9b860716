// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{
    CredentialStore, CredentialVerifier, PermissionEvaluator, RoleCache, RoleStore, SessionManager,
    SessionStore, TokenIssuer,
};
use crate::config::Settings;
use crate::storage::MemoryStore;

/// Shared handles injected into every handler.
///
/// Everything here is built once at startup; nothing is global.
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<TokenIssuer>,
    pub sessions: Arc<SessionManager>,
    pub credentials: Arc<CredentialVerifier>,
    pub permissions: Arc<PermissionEvaluator>,
    /// Role assignments, uncached. Role management writes here.
    pub roles: Arc<dyn RoleStore>,
}

impl AppState {
    pub fn new(
        issuer: TokenIssuer,
        session_store: Arc<dyn SessionStore>,
        role_store: Arc<dyn RoleStore>,
        credential_store: Arc<dyn CredentialStore>,
        role_cache: RoleCache,
    ) -> Self {
        let issuer = Arc::new(issuer);
        Self {
            sessions: Arc::new(SessionManager::new(issuer.clone(), session_store)),
            credentials: Arc::new(CredentialVerifier::new(credential_store)),
            permissions: Arc::new(PermissionEvaluator::new(Arc::new(role_cache))),
            roles: role_store,
            issuer,
        }
    }

    /// Build from settings over a store that backs sessions, roles and
    /// credentials.
    pub fn from_settings<S>(settings: &Settings, store: Arc<S>) -> Self
    where
        S: SessionStore + RoleStore + CredentialStore + 'static,
    {
        let issuer = TokenIssuer::new(
            settings.token_secret.as_bytes(),
            settings.access_token_ttl,
            settings.refresh_token_ttl,
        );
        let role_cache = RoleCache::new(store.clone(), settings.role_cache_capacity, settings.role_cache_ttl);
        Self::new(issuer, store.clone(), store.clone(), store, role_cache)
    }

    /// In-memory state for tests and local runs.
    pub fn in_memory(secret: &[u8], store: Arc<MemoryStore>) -> Self {
        let role_cache = RoleCache::with_defaults(store.clone());
        Self::new(
            TokenIssuer::with_default_ttls(secret),
            store.clone(),
            store.clone(),
            store,
            role_cache,
        )
    }
}
