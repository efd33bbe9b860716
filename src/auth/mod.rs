// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Token issuance, principal resolution and permission gating.
//!
//! ## Request Flow
//!
//! 1. [`middleware::resolve_principal`] reads `Authorization: Bearer <token>`
//!    and attaches the caller, or [`Principal::Anonymous`] when there is no
//!    header.
//! 2. Routes wrapped with [`PermissionEvaluator::wrap`] check their declared
//!    [`Permission`]s and answer `403` before the handler runs.
//! 3. Handlers read the caller through [`CurrentPrincipal`] or
//!    [`Authenticated`].
//!
//! Login checks a password with [`CredentialVerifier`] and then starts a
//! session through [`SessionManager::login`].
//!
//! ## Tokens
//!
//! - HS512, keyed with the SHA-512 digest of the configured secret
//! - access tokens: 30 minutes by default
//! - refresh tokens: 30 days by default, bound to a `(user, device)` session
//!   and rotated on every use
//! - no clock skew leeway beyond a two minute `nbf` backdate

pub mod claims;
pub mod credentials;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod middleware;
pub mod permissions;
pub mod role_cache;
pub mod roles;
pub mod session;
pub mod tokens;

pub use claims::{Claims, Principal, TokenUse, UserId};
pub use credentials::{Credential, CredentialStore, CredentialVerifier};
pub use error::{AuthError, ErrorCategory};
pub use extractor::{Authenticated, CurrentPrincipal};
pub use gate::PermissionLayer;
pub use permissions::{AccessContext, Permission, PermissionEvaluator};
pub use role_cache::{RoleCache, RoleStore};
pub use roles::{Role, RoleSet};
pub use session::{DeviceId, Session, SessionManager, SessionStore};
pub use tokens::{TokenIssuer, TokenPair};
