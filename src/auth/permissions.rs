// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Declarative permission predicates.
//!
//! Routes declare which [`Permission`]s grant access; a request passes if
//! **any** of them holds. Predicates are evaluated in declaration order and
//! evaluation stops at the first one that holds.
//!
//! ```rust,ignore
//! Router::new().route(
//!     "/v1/users/{userID}",
//!     get(get_user).route_layer(evaluator.wrap(&[Permission::Admin, Permission::MemberIsTarget])),
//! )
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::gate::PermissionLayer;
use super::{Principal, RoleCache};

/// Path parameter compared against the caller by [`Permission::MemberIsTarget`].
pub const TARGET_USER_PARAM: &str = "userID";

/// A named access rule attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    /// Caller holds the `admin` role.
    Admin,
    /// Caller is logged in.
    Member,
    /// Caller is logged in and is the user named in the path.
    MemberIsTarget,
    /// Anyone, including anonymous callers.
    Any,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Admin => write!(f, "admin"),
            Permission::Member => write!(f, "member"),
            Permission::MemberIsTarget => write!(f, "memberIsTarget"),
            Permission::Any => write!(f, "anonym"),
        }
    }
}

/// What a permission check looks at.
#[derive(Debug, Clone, Copy)]
pub struct AccessContext<'a> {
    pub principal: &'a Principal,
    /// Value of the `userID` path parameter, if the route has one.
    pub target_user_id: Option<&'a str>,
}

impl<'a> AccessContext<'a> {
    pub fn new(principal: &'a Principal) -> Self {
        Self {
            principal,
            target_user_id: None,
        }
    }

    pub fn with_target(mut self, target_user_id: &'a str) -> Self {
        self.target_user_id = Some(target_user_id);
        self
    }
}

/// Evaluates permission predicates against a request's principal.
pub struct PermissionEvaluator {
    roles: Arc<RoleCache>,
}

impl PermissionEvaluator {
    pub fn new(roles: Arc<RoleCache>) -> Self {
        Self { roles }
    }

    pub fn role_cache(&self) -> &Arc<RoleCache> {
        &self.roles
    }

    /// Gate a handler behind `required`.
    ///
    /// The returned layer runs [`check`](Self::check) before the handler and
    /// answers `403 permission_denied` without calling it when no predicate
    /// holds.
    pub fn wrap(self: &Arc<Self>, required: &[Permission]) -> PermissionLayer {
        PermissionLayer::new(self.clone(), required)
    }

    /// `true` if any of `required` holds. An empty list never does.
    pub async fn check(&self, ctx: &AccessContext<'_>, required: &[Permission]) -> bool {
        for permission in required {
            if self.holds(*permission, ctx).await {
                tracing::debug!(
                    principal = %ctx.principal,
                    permission = %permission,
                    "Access granted"
                );
                return true;
            }
        }

        tracing::debug!(principal = %ctx.principal, ?required, "Access denied");
        false
    }

    async fn holds(&self, permission: Permission, ctx: &AccessContext<'_>) -> bool {
        match permission {
            Permission::Any => true,
            Permission::Member => ctx.principal.is_authenticated(),
            Permission::MemberIsTarget => member_is_target(ctx),
            Permission::Admin => self.is_admin(ctx.principal).await,
        }
    }

    /// Role lookup failures deny; they never grant.
    async fn is_admin(&self, principal: &Principal) -> bool {
        let Some(user_id) = principal.user_id() else {
            return false;
        };

        match self.roles.is_admin(user_id).await {
            Ok(is_admin) => is_admin,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Role lookup failed, treating as not admin");
                false
            }
        }
    }
}

fn member_is_target(ctx: &AccessContext<'_>) -> bool {
    match (ctx.principal.user_id(), ctx.target_user_id) {
        (Some(caller), Some(target)) if !target.is_empty() => caller.as_str() == target,
        _ => false,
    }
}
