//! Signed access/refresh token pairs.
//!
//! Access tokens are stateless and short-lived. Refresh tokens are also
//! signed but must additionally exist in the `refresh_tokens` table; every
//! refresh rotates the stored row so a presented token is never valid twice.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::api::error::ApiError;

use super::storage;

/// Discriminator carried by refresh claims so a refresh token can never be
/// presented as an access token.
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub email: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug)]
pub struct TokenService {
    access_secret: SecretString,
    refresh_secret: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(
        access_secret: SecretString,
        refresh_secret: SecretString,
        access_ttl_minutes: i64,
        refresh_ttl_days: i64,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl: Duration::minutes(access_ttl_minutes),
            refresh_ttl: Duration::days(refresh_ttl_days),
        }
    }

    /// Mint a signed access/refresh pair for one identity.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_pair(&self, user_id: Uuid, email: &str) -> Result<TokenPair> {
        let now = Utc::now();

        let access_claims = AccessClaims {
            sub: user_id,
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        let access = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.access_secret.expose_secret().as_bytes()),
        )
        .context("failed to sign access token")?;

        let refresh_claims = RefreshClaims {
            sub: user_id,
            email: email.to_string(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        let refresh = encode(
            &Header::default(),
            &refresh_claims,
            &EncodingKey::from_secret(self.refresh_secret.expose_secret().as_bytes()),
        )
        .context("failed to sign refresh token")?;

        Ok(TokenPair { access, refresh })
    }

    /// Validate an access token signature and expiry.
    ///
    /// # Errors
    /// `TokenError::Expired` for a lapsed TTL, `TokenError::Invalid` otherwise.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.access_secret.expose_secret().as_bytes()),
            &validation(),
        )
        .map_err(classify)?;

        Ok(data.claims)
    }

    /// Validate a refresh token signature, expiry, and type discriminator.
    ///
    /// # Errors
    /// `TokenError::Expired` or `TokenError::Invalid`.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let data = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.expose_secret().as_bytes()),
            &validation(),
        )
        .map_err(classify)?;

        if data.claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(TokenError::Invalid);
        }

        Ok(data.claims)
    }

    /// Expiry timestamp for a newly persisted refresh token row.
    #[must_use]
    pub fn refresh_expires_at(&self) -> DateTime<Utc> {
        Utc::now() + self.refresh_ttl
    }

    /// Rotate a presented refresh token: verify it, delete its row, and
    /// persist a freshly minted replacement in the same transaction.
    ///
    /// Signature failures, missing rows, and expired rows all collapse into
    /// the same `UnauthorizedError` to avoid an oracle.
    ///
    /// # Errors
    /// `ApiError::Unauthorized` for any invalid presentation.
    pub async fn rotate_refresh(&self, pool: &PgPool, presented: &str) -> Result<TokenPair, ApiError> {
        let claims = self
            .verify_refresh(presented)
            .map_err(|_| ApiError::Unauthorized("Invalid refresh token".to_string()))?;

        let mut tx = pool
            .begin()
            .await
            .context("begin refresh rotation transaction")?;

        // Delete-then-insert keeps rotation atomic: of two concurrent
        // rotations of one token, only the one that deletes the row wins.
        let deleted = storage::delete_refresh_token(&mut tx, presented, claims.sub).await?;
        if !deleted {
            let _ = tx.rollback().await;
            return Err(ApiError::Unauthorized("Invalid refresh token".to_string()));
        }

        let pair = self.issue_pair(claims.sub, &claims.email)?;
        storage::insert_refresh_token(&mut tx, claims.sub, &pair.refresh, self.refresh_expires_at())
            .await?;

        tx.commit()
            .await
            .context("commit refresh rotation transaction")?;

        Ok(pair)
    }

    /// Delete every stored row matching the token. Idempotent: revoking an
    /// unknown token is not an error.
    ///
    /// # Errors
    /// Returns an error only on storage failure.
    pub async fn revoke(&self, pool: &PgPool, token: &str) -> Result<(), ApiError> {
        storage::delete_refresh_tokens_by_token(pool, token).await?;
        Ok(())
    }
}

fn validation() -> Validation {
    let mut validation = Validation::default();
    validation.leeway = 0;
    validation
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(
            SecretString::from("access-secret".to_string()),
            SecretString::from("refresh-secret".to_string()),
            15,
            7,
        )
    }

    #[test]
    fn access_round_trip_preserves_identity() {
        let service = service();
        let user_id = Uuid::new_v4();
        let pair = service.issue_pair(user_id, "a@example.edu").unwrap();

        let claims = service.verify_access(&pair.access).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "a@example.edu");
    }

    #[test]
    fn refresh_claims_carry_type_discriminator() {
        let service = service();
        let pair = service.issue_pair(Uuid::new_v4(), "a@example.edu").unwrap();

        let claims = service.verify_refresh(&pair.refresh).unwrap();
        assert_eq!(claims.token_type, REFRESH_TOKEN_TYPE);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let service = service();
        let pair = service.issue_pair(Uuid::new_v4(), "a@example.edu").unwrap();

        assert_eq!(
            service.verify_access(&pair.refresh),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let service = service();
        let pair = service.issue_pair(Uuid::new_v4(), "a@example.edu").unwrap();

        assert_eq!(
            service.verify_refresh(&pair.access),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn expired_access_token_is_reported_as_expired() {
        let service = service();
        let now = Utc::now();
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            email: "a@example.edu".to_string(),
            iat: (now - Duration::minutes(30)).timestamp(),
            exp: (now - Duration::minutes(15)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();

        assert_eq!(service.verify_access(&token), Err(TokenError::Expired));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let service = service();
        let pair = service.issue_pair(Uuid::new_v4(), "a@example.edu").unwrap();

        let mut tampered = pair.access;
        tampered.pop();
        assert_eq!(service.verify_access(&tampered), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_is_invalid_not_expired() {
        let service = service();
        assert_eq!(
            service.verify_access("not-a-token"),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn refresh_expiry_is_in_the_future() {
        let service = service();
        assert!(service.refresh_expires_at() > Utc::now() + Duration::days(6));
    }
}
