// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Implementations of the session, role and credential stores the auth core
//! depends on.
//!
//! - [`AuthDatabase`]: redb file under the data directory, used in production
//! - [`MemoryStore`]: process-local maps, used by tests and ephemeral runs
//!
//! Both implement [`SessionStore`](crate::auth::SessionStore),
//! [`RoleStore`](crate::auth::RoleStore) and
//! [`CredentialStore`](crate::auth::CredentialStore).

pub mod auth_db;
pub mod error;
pub mod memory;

pub use auth_db::AuthDatabase;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
