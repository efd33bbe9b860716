// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password credentials and login verification.
//!
//! Passwords are stored as Argon2id PHC strings. Hashing and verification are
//! CPU bound and run on the blocking pool.
//!
//! An unknown login and a wrong password both yield
//! [`AuthError::InvalidCredentials`]. An unknown login is still checked
//! against a fixed hash so both paths cost about the same.

use std::sync::{Arc, OnceLock};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuthError, Principal, UserId};
use crate::storage::StoreResult;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Stored login for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: UserId,
    /// Normalized login, see [`normalize_login`].
    pub login: String,
    pub password_hash: String,
}

/// Storage for password credentials, unique per login.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credential(&self, login: &str) -> StoreResult<Option<Credential>>;

    /// Insert unless the login is taken. Returns `false` when it is.
    async fn create_credential(&self, credential: &Credential) -> StoreResult<bool>;
}

/// Trimmed and lowercased. Empty logins are rejected.
pub fn normalize_login(raw: &str) -> Result<String, AuthError> {
    let login = raw.trim().to_lowercase();
    if login.is_empty() {
        return Err(AuthError::InvalidRequest("login is required".to_string()));
    }
    Ok(login)
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// `false` for a wrong password and for a hash that does not parse.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn decoy_hash() -> Option<&'static str> {
    static DECOY: OnceLock<Option<String>> = OnceLock::new();
    DECOY
        .get_or_init(|| hash_password("decoy-password").ok())
        .as_deref()
}

async fn blocking<T, F>(op: F) -> Result<T, AuthError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// Registers users and checks their passwords.
pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Create a user with a fresh id.
    ///
    /// # Errors
    /// `InvalidRequest` for an empty login or short password, `LoginTaken`
    /// if the login is registered already.
    pub async fn register(&self, login: &str, password: &str) -> Result<UserId, AuthError> {
        let login = normalize_login(login)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidRequest(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let password = password.to_string();
        let password_hash = blocking(move || hash_password(&password)).await??;
        let user_id = UserId::new(Uuid::new_v4().to_string()).ok_or(AuthError::InvalidIdentity)?;

        let credential = Credential {
            user_id: user_id.clone(),
            login,
            password_hash,
        };
        if !self.store.create_credential(&credential).await? {
            return Err(AuthError::LoginTaken);
        }

        tracing::info!(user_id = %user_id, "User registered");
        Ok(user_id)
    }

    /// Check a login and password, returning the user they belong to.
    pub async fn verify(&self, login: &str, password: &str) -> Result<Principal, AuthError> {
        let login = normalize_login(login).map_err(|_| AuthError::InvalidCredentials)?;
        let credential = self.store.find_credential(&login).await?;

        let stored_hash = credential.as_ref().map(|c| c.password_hash.clone());
        let password = password.to_string();
        let matched = blocking(move || match stored_hash {
            Some(hash) => verify_password(&password, &hash),
            None => {
                if let Some(decoy) = decoy_hash() {
                    let _ = verify_password(&password, decoy);
                }
                false
            }
        })
        .await?;

        match credential {
            Some(credential) if matched => Ok(Principal::user(credential.user_id)),
            _ => {
                tracing::debug!(login = %login, "Login rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}
