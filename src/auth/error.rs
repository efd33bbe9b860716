// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication, authorization and session errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StoreError;

/// Broad class of an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Who is calling could not be established.
    Authentication,
    /// The caller is known but not allowed.
    Authorization,
    /// The refresh session does not exist or is no longer valid.
    Session,
    /// A backing store failed.
    Dependency,
    /// Bad input or a fault on our side.
    Internal,
}

/// Error type for everything the auth core reports to a caller.
///
/// Authentication, authorization and session errors are terminal for the
/// request and never retried internally.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    MalformedHeader,

    #[error("Token is malformed")]
    MalformedToken,

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is not yet valid")]
    TokenNotYetValid,

    #[error("Token was issued for {actual} use, expected {expected}")]
    WrongTokenUse {
        expected: super::TokenUse,
        actual: super::TokenUse,
    },

    /// Refresh token failed verification for any reason.
    #[error("Refresh token is invalid")]
    InvalidToken,

    #[error("Authentication is required")]
    AuthenticationRequired,

    /// Unknown login and wrong password are reported the same way.
    #[error("Invalid login or password")]
    InvalidCredentials,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session has expired")]
    SessionExpired,

    /// Tokens can only be issued for an authenticated principal.
    #[error("Cannot issue tokens for an anonymous principal")]
    InvalidIdentity,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Login is already registered")]
    LoginTaken,

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Backing store failure: {0}")]
    Dependency(#[from] StoreError),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AuthError::MalformedHeader
            | AuthError::MalformedToken
            | AuthError::SignatureInvalid
            | AuthError::TokenExpired
            | AuthError::TokenNotYetValid
            | AuthError::WrongTokenUse { .. }
            | AuthError::InvalidToken
            | AuthError::AuthenticationRequired
            | AuthError::InvalidCredentials => ErrorCategory::Authentication,
            AuthError::PermissionDenied => ErrorCategory::Authorization,
            AuthError::SessionNotFound | AuthError::SessionExpired => ErrorCategory::Session,
            AuthError::Dependency(_) => ErrorCategory::Dependency,
            AuthError::InvalidIdentity
            | AuthError::InvalidRequest(_)
            | AuthError::LoginTaken
            | AuthError::Signing(_)
            | AuthError::PasswordHash(_) => ErrorCategory::Internal,
        }
    }

    /// Get the error code for this error.
    ///
    /// Both session variants share one code: a caller must not be able to
    /// tell a missing session from an expired one.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MalformedHeader => "malformed_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::SignatureInvalid => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::WrongTokenUse { .. } => "wrong_token_use",
            AuthError::InvalidToken => "invalid_token",
            AuthError::AuthenticationRequired => "authentication_required",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::PermissionDenied => "permission_denied",
            AuthError::SessionNotFound | AuthError::SessionExpired => "session_not_found",
            AuthError::InvalidIdentity => "invalid_identity",
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::LoginTaken => "login_taken",
            AuthError::Signing(_) | AuthError::PasswordHash(_) => "internal_error",
            AuthError::Dependency(_) => "dependency_unavailable",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Authentication | ErrorCategory::Session => StatusCode::UNAUTHORIZED,
            ErrorCategory::Authorization => StatusCode::FORBIDDEN,
            ErrorCategory::Dependency => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Internal => match self {
                AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                AuthError::LoginTaken => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Message safe to show a caller. Store and signing details stay in logs.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::SessionNotFound | AuthError::SessionExpired => {
                AuthError::SessionNotFound.to_string()
            }
            AuthError::Dependency(_) => "A backing service is unavailable".to_string(),
            AuthError::Signing(_) | AuthError::PasswordHash(_) => {
                "Internal authentication error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Log the detail [`public_message`](Self::public_message) hides.
    pub(crate) fn log_hidden_detail(&self) {
        match self {
            AuthError::Dependency(source) => {
                tracing::warn!(error = %source, "Store operation failed");
            }
            AuthError::Signing(detail) | AuthError::PasswordHash(detail) => {
                tracing::error!(error = %detail, "Credential processing failed");
            }
            _ => {}
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log_hidden_detail();
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.public_message(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
