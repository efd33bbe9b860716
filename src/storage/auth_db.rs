// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded session, role and credential database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `sessions`: session key (user + device) → serialized Session
//! - `user_roles`: user_id → serialized RoleSet
//! - `credentials`: normalized login → serialized Credential
//!
//! Every write runs in its own redb write transaction, so a failed write
//! leaves the previous state in place. redb blocks on disk I/O and write
//! transactions are serialized, so every operation runs on the blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{StoreError, StoreResult};
use crate::auth::{
    Credential, CredentialStore, DeviceId, Role, RoleSet, RoleStore, Session, SessionStore, UserId,
};

// =============================================================================
// Table Definitions
// =============================================================================

/// Sessions: session key → Session (JSON bytes). One row per (user, device).
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Role assignments: user_id → RoleSet (JSON bytes).
const USER_ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("user_roles");

/// Password credentials: login → Credential (JSON bytes).
const CREDENTIALS: TableDefinition<&str, &[u8]> = TableDefinition::new("credentials");

/// Build the unique key for a (user, device) pair.
///
/// Format: `len(user_id):user_id|device_id`. The length prefix keeps ids that
/// contain the separator from colliding.
fn session_key(user_id: &UserId, device_id: &DeviceId) -> String {
    let user = user_id.as_str();
    format!("{}:{}|{}", user.len(), user, device_id.as_str())
}

// =============================================================================
// AuthDatabase
// =============================================================================

/// Persistent store for refresh sessions, role assignments and credentials.
pub struct AuthDatabase {
    db: Arc<Database>,
}

impl AuthDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSIONS)?;
            let _ = write_txn.open_table(USER_ROLES)?;
            let _ = write_txn.open_table(CREDENTIALS)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Run a database operation on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Unavailable(format!("database task failed: {e}")))?
    }
}

// =============================================================================
// Sessions
// =============================================================================

fn load_session(db: &Database, user_id: &UserId, device_id: &DeviceId) -> StoreResult<Option<Session>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(SESSIONS)?;
    match table.get(session_key(user_id, device_id).as_str())? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn write_session(db: &Database, session: &Session) -> StoreResult<()> {
    let json = serde_json::to_vec(session)?;
    let key = session_key(&session.user_id, &session.device_id);

    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(SESSIONS)?;
        table.insert(key.as_str(), json.as_slice())?;
    }
    write_txn.commit()?;
    Ok(())
}

/// Compare-and-swap inside a single write transaction.
fn swap_session(db: &Database, previous_token: &str, session: &Session) -> StoreResult<bool> {
    let json = serde_json::to_vec(session)?;
    let key = session_key(&session.user_id, &session.device_id);

    let write_txn = db.begin_write()?;
    let swapped = {
        let mut table = write_txn.open_table(SESSIONS)?;
        let current: Option<Session> = match table.get(key.as_str())? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        match current {
            Some(current) if current.refresh_token == previous_token => {
                table.insert(key.as_str(), json.as_slice())?;
                true
            }
            _ => false,
        }
    };

    if swapped {
        write_txn.commit()?;
    } else {
        write_txn.abort()?;
    }
    Ok(swapped)
}

// =============================================================================
// Roles
// =============================================================================

fn load_roles(db: &Database, user_id: &UserId) -> StoreResult<RoleSet> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(USER_ROLES)?;
    match table.get(user_id.as_str())? {
        Some(value) => Ok(serde_json::from_slice(value.value())?),
        None => Ok(RoleSet::new()),
    }
}

/// Read-modify-write of one user's role set. Returns whatever `update`
/// returned.
fn update_roles(
    db: &Database,
    user_id: &UserId,
    update: impl FnOnce(&mut RoleSet) -> bool,
) -> StoreResult<bool> {
    let write_txn = db.begin_write()?;
    let changed = {
        let mut table = write_txn.open_table(USER_ROLES)?;
        let mut roles: RoleSet = match table.get(user_id.as_str())? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => RoleSet::new(),
        };

        let changed = update(&mut roles);
        if changed {
            if roles.is_empty() {
                table.remove(user_id.as_str())?;
            } else {
                let json = serde_json::to_vec(&roles)?;
                table.insert(user_id.as_str(), json.as_slice())?;
            }
        }
        changed
    };
    write_txn.commit()?;
    Ok(changed)
}

// =============================================================================
// Credentials
// =============================================================================

fn load_credential(db: &Database, login: &str) -> StoreResult<Option<Credential>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(CREDENTIALS)?;
    match table.get(login)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Insert-if-absent inside a single write transaction.
fn insert_credential(db: &Database, credential: &Credential) -> StoreResult<bool> {
    let json = serde_json::to_vec(credential)?;

    let write_txn = db.begin_write()?;
    let inserted = {
        let mut table = write_txn.open_table(CREDENTIALS)?;
        if table.get(credential.login.as_str())?.is_some() {
            false
        } else {
            table.insert(credential.login.as_str(), json.as_slice())?;
            true
        }
    };

    if inserted {
        write_txn.commit()?;
    } else {
        write_txn.abort()?;
    }
    Ok(inserted)
}

#[async_trait]
impl SessionStore for AuthDatabase {
    async fn find_session(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        refresh_token: &str,
    ) -> StoreResult<Option<Session>> {
        let (user, device) = (user_id.clone(), device_id.clone());
        let found = self.blocking(move |db| load_session(db, &user, &device)).await?;
        Ok(found.filter(|s| s.matches(user_id, device_id, refresh_token)))
    }

    async fn upsert_session(&self, session: &Session) -> StoreResult<()> {
        let session = session.clone();
        self.blocking(move |db| write_session(db, &session)).await
    }

    async fn rotate_session(&self, previous_token: &str, session: &Session) -> StoreResult<bool> {
        let (previous_token, session) = (previous_token.to_string(), session.clone());
        self.blocking(move |db| swap_session(db, &previous_token, &session))
            .await
    }
}

#[async_trait]
impl RoleStore for AuthDatabase {
    async fn roles_for(&self, user_id: &UserId) -> StoreResult<RoleSet> {
        let user_id = user_id.clone();
        self.blocking(move |db| load_roles(db, &user_id)).await
    }

    async fn grant_role(&self, user_id: &UserId, role: &Role) -> StoreResult<()> {
        let (user_id, role) = (user_id.clone(), role.clone());
        self.blocking(move |db| update_roles(db, &user_id, |roles| roles.insert(role)))
            .await?;
        Ok(())
    }

    async fn revoke_role(&self, user_id: &UserId, role: &Role) -> StoreResult<bool> {
        let (user_id, role) = (user_id.clone(), role.clone());
        self.blocking(move |db| update_roles(db, &user_id, |roles| roles.remove(&role)))
            .await
    }
}

#[async_trait]
impl CredentialStore for AuthDatabase {
    async fn find_credential(&self, login: &str) -> StoreResult<Option<Credential>> {
        let login = login.to_string();
        self.blocking(move |db| load_credential(db, &login)).await
    }

    async fn create_credential(&self, credential: &Credential) -> StoreResult<bool> {
        let credential = credential.clone();
        self.blocking(move |db| insert_credential(db, &credential))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_db() -> (AuthDatabase, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = AuthDatabase::open(&dir.path().join("auth.redb")).unwrap();
        (db, dir)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn device(id: &str) -> DeviceId {
        DeviceId::parse(id).unwrap()
    }

    fn session(user_id: &str, device_id: &str, token: &str) -> Session {
        Session {
            user_id: user(user_id),
            device_id: device(device_id),
            refresh_token: token.to_string(),
            expires_at: 4_000_000_000,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_same_device() {
        let (db, _dir) = temp_db();
        db.upsert_session(&session("alice", "phone", "t1")).await.unwrap();
        db.upsert_session(&session("alice", "phone", "t2")).await.unwrap();

        assert!(db.find_session(&user("alice"), &device("phone"), "t1").await.unwrap().is_none());
        let found = db.find_session(&user("alice"), &device("phone"), "t2").await.unwrap();
        assert_eq!(found, Some(session("alice", "phone", "t2")));
    }

    #[tokio::test]
    async fn find_requires_exact_triple() {
        let (db, _dir) = temp_db();
        db.upsert_session(&session("alice", "phone", "t1")).await.unwrap();

        assert!(db.find_session(&user("bob"), &device("phone"), "t1").await.unwrap().is_none());
        assert!(db.find_session(&user("alice"), &device("laptop"), "t1").await.unwrap().is_none());
        assert!(db.find_session(&user("alice"), &device("phone"), "t9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotate_is_compare_and_swap() {
        let (db, _dir) = temp_db();
        db.upsert_session(&session("alice", "phone", "t1")).await.unwrap();

        assert!(db.rotate_session("t1", &session("alice", "phone", "t2")).await.unwrap());
        assert!(!db.rotate_session("t1", &session("alice", "phone", "t3")).await.unwrap());

        assert!(db.find_session(&user("alice"), &device("phone"), "t2").await.unwrap().is_some());
        assert!(db.find_session(&user("alice"), &device("phone"), "t3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth.redb");
        {
            let db = AuthDatabase::open(&path).unwrap();
            db.upsert_session(&session("alice", "phone", "t1")).await.unwrap();
        }
        let db = AuthDatabase::open(&path).unwrap();
        assert!(db.find_session(&user("alice"), &device("phone"), "t1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn roles_grant_revoke_and_list() {
        let (db, _dir) = temp_db();
        assert!(db.roles_for(&user("alice")).await.unwrap().is_empty());

        db.grant_role(&user("alice"), &Role::admin()).await.unwrap();
        db.grant_role(&user("alice"), &Role::admin()).await.unwrap();
        db.grant_role(&user("alice"), &Role::parse("auditor").unwrap()).await.unwrap();
        let roles = db.roles_for(&user("alice")).await.unwrap();
        assert!(roles.is_admin());
        assert_eq!(roles.iter().count(), 2);

        assert!(db.revoke_role(&user("alice"), &Role::admin()).await.unwrap());
        assert!(!db.revoke_role(&user("alice"), &Role::admin()).await.unwrap());
        assert!(!db.roles_for(&user("alice")).await.unwrap().is_admin());
    }

    #[tokio::test]
    async fn credentials_insert_if_absent_and_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth.redb");
        let credential = Credential {
            user_id: user("alice"),
            login: "alice@example.com".to_string(),
            password_hash: "hash-a".to_string(),
        };
        {
            let db = AuthDatabase::open(&path).unwrap();
            assert!(db.create_credential(&credential).await.unwrap());
            let taken = Credential {
                user_id: user("mallory"),
                ..credential.clone()
            };
            assert!(!db.create_credential(&taken).await.unwrap());
        }
        let db = AuthDatabase::open(&path).unwrap();
        assert_eq!(
            db.find_credential("alice@example.com").await.unwrap(),
            Some(credential)
        );
        assert_eq!(db.find_credential("bob@example.com").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writers_all_land() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);

        let mut handles = Vec::new();
        for i in 0..16 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                let user_id = format!("user-{i}");
                db.upsert_session(&session(&user_id, "phone", "t1")).await.unwrap();
                db.grant_role(&user(&user_id), &Role::admin()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..16 {
            let user_id = user(&format!("user-{i}"));
            assert!(db.find_session(&user_id, &device("phone"), "t1").await.unwrap().is_some());
            assert!(db.roles_for(&user_id).await.unwrap().is_admin());
        }
    }

    #[test]
    fn session_keys_do_not_collide() {
        let a = session_key(&user("a|b"), &device("c"));
        let b = session_key(&user("a"), &device("b|c"));
        assert_ne!(a, b);
    }
}
