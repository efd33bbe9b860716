// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory session, role and credential store.
//!
//! Backs tests and local runs without a data directory. Call counters and a
//! failure switch let tests observe how often the store is hit and how the
//! auth core behaves when it is down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StoreError, StoreResult};
use crate::auth::{
    Credential, CredentialStore, DeviceId, Role, RoleSet, RoleStore, Session, SessionStore, UserId,
};

#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<(UserId, DeviceId), Session>>,
    roles: StdRwLock<HashMap<UserId, RoleSet>>,
    credentials: RwLock<HashMap<String, Credential>>,
    failing: AtomicBool,
    role_latency_ms: AtomicU64,
    role_loads: AtomicUsize,
    session_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a role without going through the async trait.
    pub fn seed_role(&self, user_id: &UserId, role: Role) {
        self.roles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.clone())
            .or_default()
            .insert(role);
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay applied to every `roles_for` call.
    pub fn set_role_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.role_latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of `roles_for` calls so far.
    pub fn role_loads(&self) -> usize {
        self.role_loads.load(Ordering::SeqCst)
    }

    /// Number of `find_session` calls so far.
    pub fn session_lookups(&self) -> usize {
        self.session_lookups.load(Ordering::SeqCst)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_session(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        refresh_token: &str,
    ) -> StoreResult<Option<Session>> {
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&(user_id.clone(), device_id.clone()))
            .filter(|s| s.matches(user_id, device_id, refresh_token))
            .cloned())
    }

    async fn upsert_session(&self, session: &Session) -> StoreResult<()> {
        self.check_available()?;

        let key = (session.user_id.clone(), session.device_id.clone());
        self.sessions.write().await.insert(key, session.clone());
        Ok(())
    }

    async fn rotate_session(&self, previous_token: &str, session: &Session) -> StoreResult<bool> {
        self.check_available()?;

        let key = (session.user_id.clone(), session.device_id.clone());
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&key) {
            Some(current) if current.refresh_token == previous_token => {
                *current = session.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn roles_for(&self, user_id: &UserId) -> StoreResult<RoleSet> {
        self.role_loads.fetch_add(1, Ordering::SeqCst);

        let latency = self.role_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.check_available()?;

        let roles = self.roles.read().unwrap_or_else(PoisonError::into_inner);
        Ok(roles.get(user_id).cloned().unwrap_or_default())
    }

    async fn grant_role(&self, user_id: &UserId, role: &Role) -> StoreResult<()> {
        self.check_available()?;
        self.seed_role(user_id, role.clone());
        Ok(())
    }

    async fn revoke_role(&self, user_id: &UserId, role: &Role) -> StoreResult<bool> {
        self.check_available()?;

        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        Ok(roles.get_mut(user_id).is_some_and(|set| set.remove(role)))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_credential(&self, login: &str) -> StoreResult<Option<Credential>> {
        self.check_available()?;
        Ok(self.credentials.read().await.get(login).cloned())
    }

    async fn create_credential(&self, credential: &Credential) -> StoreResult<bool> {
        self.check_available()?;

        let mut credentials = self.credentials.write().await;
        if credentials.contains_key(&credential.login) {
            return Ok(false);
        }
        credentials.insert(credential.login.clone(), credential.clone());
        Ok(true)
    }
}
