// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A named capability tag assigned to a user.
///
/// Roles are stored externally as plain strings. Only `admin` has a meaning
/// inside the auth core; any other tag is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Administrator of the application.
    pub const ADMIN: &'static str = "admin";

    pub fn admin() -> Self {
        Role(Self::ADMIN.to_string())
    }

    /// Parse a role tag. Tags are case-insensitive and stored lowercase.
    pub fn parse(s: &str) -> Option<Role> {
        let tag = s.trim().to_lowercase();
        if tag.is_empty() {
            None
        } else {
            Some(Role(tag))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_admin(&self) -> bool {
        self.0 == Self::ADMIN
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The roles currently assigned to one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, role: &Role) -> bool {
        self.0.contains(role)
    }

    pub fn is_admin(&self) -> bool {
        self.0.iter().any(Role::is_admin)
    }

    /// Returns `true` if the role was not already present.
    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    /// Returns `true` if the role was present.
    pub fn remove(&mut self, role: &Role) -> bool {
        self.0.remove(role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        RoleSet(iter.into_iter().collect())
    }
}
