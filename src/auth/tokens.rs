// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access/refresh token issuance and verification.
//!
//! ## Format
//!
//! Both tokens are HS512 JWTs carrying `userID`, `iat`, `nbf`, `exp`, a random
//! `jti` and a `use` tag. They share the same subject and differ in lifetime
//! and intended use.
//!
//! ## Key
//!
//! The HMAC key is the SHA-512 digest of the configured secret, derived once
//! in [`TokenIssuer::new`]. The issuer holds it for its whole lifetime and
//! exposes no way to change it.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use sha2::{Digest, Sha512};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{AuthError, Claims, Principal, TokenUse, UserId};

/// Default access token lifetime (30 minutes).
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(30 * 60);

/// Default refresh token lifetime (30 days).
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How far `nbf` is backdated to absorb clock drift between hosts.
const NOT_BEFORE_TOLERANCE_SECS: i64 = 2 * 60;

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS512;

/// Freshly minted access + refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    /// Unix seconds
    pub access_token_expires_at: i64,
    pub refresh_token: String,
    /// Unix seconds
    pub refresh_token_expires_at: i64,
}

/// Mints and verifies signed identity tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer from a shared secret and the two token lifetimes.
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let key = Sha512::digest(secret);

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Self {
            encoding_key: EncodingKey::from_secret(&key),
            decoding_key: DecodingKey::from_secret(&key),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Create an issuer with the default 30 minute / 30 day lifetimes.
    pub fn with_default_ttls(secret: &[u8]) -> Self {
        Self::new(secret, DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL)
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an access/refresh pair for an authenticated principal.
    ///
    /// # Errors
    /// `InvalidIdentity` for the anonymous principal.
    pub fn issue_tokens(&self, principal: &Principal) -> Result<TokenPair, AuthError> {
        self.issue_tokens_at(principal, Utc::now().timestamp())
    }

    pub(crate) fn issue_tokens_at(
        &self,
        principal: &Principal,
        now: i64,
    ) -> Result<TokenPair, AuthError> {
        let user_id = principal.user_id().ok_or(AuthError::InvalidIdentity)?;

        let (access_token, access_token_expires_at) =
            self.mint(user_id, TokenUse::Access, self.access_ttl, now)?;
        let (refresh_token, refresh_token_expires_at) =
            self.mint(user_id, TokenUse::Refresh, self.refresh_ttl, now)?;

        Ok(TokenPair {
            access_token,
            access_token_expires_at,
            refresh_token,
            refresh_token_expires_at,
        })
    }

    fn mint(
        &self,
        user_id: &UserId,
        token_use: TokenUse,
        ttl: Duration,
        now: i64,
    ) -> Result<(String, i64), AuthError> {
        let expires_at = now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        let claims = Claims {
            user_id: user_id.as_str().to_string(),
            iat: now,
            exp: expires_at,
            nbf: Some(now - NOT_BEFORE_TOLERANCE_SECS),
            jti: Uuid::new_v4().to_string(),
            token_use,
        };

        let token = encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        Ok((token, expires_at))
    }

    /// Verify a token's signature and time claims.
    ///
    /// The signature is checked before the claims are even parsed, so a
    /// tampered token reports `SignatureInvalid` whatever its `exp` says.
    /// On failure no claims are returned.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::SignatureInvalid
                }
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                _ => AuthError::MalformedToken,
            }
        })?;

        let claims = data.claims;
        if claims.user_id.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        Ok(claims)
    }

    /// Verify a token and require it to be an access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_for(token, TokenUse::Access)
    }

    /// Verify a token and require it to be a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_for(token, TokenUse::Refresh)
    }

    fn verify_for(&self, token: &str, expected: TokenUse) -> Result<Claims, AuthError> {
        let claims = self.verify_token(token)?;
        if claims.token_use != expected {
            return Err(AuthError::WrongTokenUse {
                expected,
                actual: claims.token_use,
            });
        }
        Ok(claims)
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &SIGNING_ALGORITHM)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    fn issuer() -> TokenIssuer {
        TokenIssuer::with_default_ttls(b"test-secret")
    }

    fn alice() -> Principal {
        Principal::user(UserId::new("alice").unwrap())
    }

    #[test]
    fn access_token_round_trips_user_id() {
        let issuer = issuer();
        let pair = issuer.issue_tokens(&alice()).unwrap();

        let claims = issuer.verify_token(&pair.access_token).unwrap();
        assert_eq!(claims.user_id, "alice");
        assert_eq!(claims.token_use, TokenUse::Access);
        assert_eq!(claims.principal(), alice());
    }

    #[test]
    fn pair_has_expected_lifetimes() {
        let issuer = issuer();
        let pair = issuer.issue_tokens_at(&alice(), 1_000_000).unwrap();
        assert_eq!(pair.access_token_expires_at, 1_000_000 + 30 * 60);
        assert_eq!(pair.refresh_token_expires_at, 1_000_000 + 30 * 24 * 3600);
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[test]
    fn anonymous_principal_cannot_get_tokens() {
        let result = issuer().issue_tokens(&Principal::Anonymous);
        assert!(matches!(result, Err(AuthError::InvalidIdentity)));
    }

    #[test]
    fn tokens_minted_together_are_distinct() {
        let issuer = issuer();
        let first = issuer.issue_tokens_at(&alice(), 1_700_000_000).unwrap();
        let second = issuer.issue_tokens_at(&alice(), 1_700_000_000).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn foreign_key_is_signature_invalid() {
        let ours = issuer();
        let theirs = TokenIssuer::with_default_ttls(b"another-secret");
        let pair = theirs.issue_tokens(&alice()).unwrap();

        assert!(matches!(
            ours.verify_token(&pair.access_token),
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[test]
    fn foreign_key_wins_over_expiry() {
        let ours = issuer();
        let theirs = TokenIssuer::with_default_ttls(b"another-secret");
        let stale = theirs.issue_tokens_at(&alice(), 1_000_000).unwrap();

        assert!(matches!(
            ours.verify_token(&stale.access_token),
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let issuer = issuer();
        let two_hours_ago = Utc::now().timestamp() - 2 * 3600;
        let pair = issuer.issue_tokens_at(&alice(), two_hours_ago).unwrap();

        assert!(matches!(
            issuer.verify_token(&pair.access_token),
            Err(AuthError::TokenExpired)
        ));
        // The refresh token from the same pair is still valid.
        assert!(issuer.verify_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn token_from_the_future_is_not_yet_valid() {
        let issuer = issuer();
        let in_an_hour = Utc::now().timestamp() + 3600;
        let pair = issuer.issue_tokens_at(&alice(), in_an_hour).unwrap();

        assert!(matches!(
            issuer.verify_token(&pair.access_token),
            Err(AuthError::TokenNotYetValid)
        ));
    }

    #[test]
    fn tampered_payload_is_signature_invalid() {
        let issuer = issuer();
        let pair = issuer.issue_tokens(&alice()).unwrap();
        let parts: Vec<&str> = pair.access_token.split('.').collect();

        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let mut claims: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        claims["userID"] = serde_json::json!("mallory");
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            issuer.verify_token(&forged),
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let issuer = issuer();
        assert!(matches!(issuer.verify_token("not-a-jwt"), Err(AuthError::MalformedToken)));
        assert!(matches!(issuer.verify_token(""), Err(AuthError::MalformedToken)));
    }

    #[test]
    fn token_use_is_enforced() {
        let issuer = issuer();
        let pair = issuer.issue_tokens(&alice()).unwrap();

        assert!(issuer.verify_access(&pair.access_token).is_ok());
        assert!(issuer.verify_refresh(&pair.refresh_token).is_ok());
        assert!(matches!(
            issuer.verify_access(&pair.refresh_token),
            Err(AuthError::WrongTokenUse { expected: TokenUse::Access, .. })
        ));
        assert!(matches!(
            issuer.verify_refresh(&pair.access_token),
            Err(AuthError::WrongTokenUse { expected: TokenUse::Refresh, .. })
        ));
    }

    #[test]
    fn debug_output_hides_key() {
        let rendered = format!("{:?}", issuer());
        assert!(rendered.contains("access_ttl"));
        assert!(!rendered.contains("test-secret"));
    }
}
