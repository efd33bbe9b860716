// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Finance Auth - token authentication and permission gating for the finance API
//!
//! ## Modules
//!
//! - `auth` - Token issuance, principal resolution, permissions, role cache, sessions
//! - `api` - HTTP handlers owned by the auth core (Axum)
//! - `storage` - Session and role stores (redb, in-memory)
//! - `config` - Environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
pub mod storage;
