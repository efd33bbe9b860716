// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the authenticated principal.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Opaque user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a raw identifier. Returns `None` for an empty string.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The subject of a request.
///
/// Anonymous callers are an explicit variant rather than an empty id, so
/// every permission predicate has to decide what to do with them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Principal {
    /// No credentials were presented.
    #[default]
    Anonymous,
    /// A caller holding a verified access token.
    User(UserId),
}

impl Principal {
    pub fn user(id: UserId) -> Self {
        Principal::User(id)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn is_authenticated(&self) -> bool {
        !self.is_anonymous()
    }

    /// The user id, if any.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Principal::Anonymous => None,
            Principal::User(id) => Some(id),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Anonymous => write!(f, "(none)"),
            Principal::User(id) => write!(f, "UserID[{id}]"),
        }
    }
}

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    /// Short-lived, presented on ordinary requests.
    Access,
    /// Long-lived, only accepted by the refresh flow.
    Refresh,
}

impl fmt::Display for TokenUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenUse::Access => write!(f, "access"),
            TokenUse::Refresh => write!(f, "refresh"),
        }
    }
}

/// Signed payload of an issued token.
///
/// Values of this type only leave the token module after the signature and
/// time claims have been validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject
    #[serde(rename = "userID")]
    pub user_id: String,

    /// Issued at (Unix seconds)
    pub iat: i64,

    /// Expiration (Unix seconds)
    pub exp: i64,

    /// Not before (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Unique token id, keeps two tokens minted in the same second distinct
    pub jti: String,

    #[serde(rename = "use")]
    pub token_use: TokenUse,
}

impl Claims {
    /// The principal these claims speak for.
    pub fn principal(&self) -> Principal {
        UserId::new(self.user_id.clone())
            .map(Principal::User)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> Claims {
        Claims {
            user_id: "user_123".to_string(),
            iat: 1700000000,
            exp: 1700001800,
            nbf: Some(1699999880),
            jti: "b2c1".to_string(),
            token_use: TokenUse::Access,
        }
    }

    #[test]
    fn empty_user_id_is_rejected() {
        assert!(UserId::new("").is_none());
        assert_eq!(UserId::new("u1").unwrap().as_str(), "u1");
    }

    #[test]
    fn anonymous_is_distinct_from_user() {
        let anon = Principal::Anonymous;
        assert!(anon.is_anonymous());
        assert!(anon.user_id().is_none());

        let user = Principal::user(UserId::new("u1").unwrap());
        assert!(user.is_authenticated());
        assert_eq!(user.user_id().map(UserId::as_str), Some("u1"));
        assert_ne!(anon, user);
    }

    #[test]
    fn principal_display() {
        assert_eq!(Principal::Anonymous.to_string(), "(none)");
        let user = Principal::user(UserId::new("u1").unwrap());
        assert_eq!(user.to_string(), "UserID[u1]");
    }

    #[test]
    fn claims_serialize_with_wire_names() {
        let json = serde_json::to_value(sample_claims()).unwrap();
        assert_eq!(json["userID"], "user_123");
        assert_eq!(json["use"], "access");
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn claims_with_empty_subject_map_to_anonymous() {
        let mut claims = sample_claims();
        claims.user_id = String::new();
        assert!(claims.principal().is_anonymous());
    }
}
