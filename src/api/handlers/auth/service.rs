//! Registration and session flows, independent of HTTP.
//!
//! Handlers stay thin: they parse the request, call one function here, and
//! shape the response. Everything observable about the flows (messages,
//! which failures collapse into which responses, transaction scope) lives in
//! this module.

use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::error::ApiError;

use super::otp;
use super::state::AuthState;
use super::storage::{self, NewUser, ProfileRecord, UserInsert, UserRecord};
use super::tokens::TokenPair;
use super::types::{CompleteRequest, LoginRequest};
use super::validate;

/// Start registration: validate the address, enforce the domain policy,
/// issue a code, and deliver it.
///
/// # Errors
/// `Validation` for a malformed or out-of-policy address, `Conflict` for a
/// registered one, `Delivery` when the mailer fails.
pub async fn initiate(pool: &PgPool, state: &AuthState, email: &str) -> Result<(), ApiError> {
    let email = validate::normalize_email(email);
    validate::check_email(&email).map_err(ApiError::validation)?;

    if !state.config().email_allowed(&email) {
        return Err(ApiError::validation(
            "Registration is restricted to university email addresses",
        ));
    }

    if storage::email_exists(pool, &email).await? {
        return Err(ApiError::Conflict(
            "User with this email already exists".to_string(),
        ));
    }

    let ttl_minutes = state.config().otp_ttl_minutes();
    let code = otp::issue(pool, &email, otp::PURPOSE_VERIFICATION, ttl_minutes).await?;

    state
        .mailer()
        .send_code(&email, &code, ttl_minutes)
        .await
        .map_err(|err| {
            warn!(to_email = %email, "verification email failed: {err:#}");
            ApiError::Delivery("Failed to send verification email".to_string())
        })?;

    info!(to_email = %email, "verification code issued");
    Ok(())
}

/// Finish registration: consume the code, create the identity, and open a
/// session, all in one transaction.
///
/// # Errors
/// `Validation` for bad fields or a wrong/expired code, `Conflict` for a
/// taken email or username.
pub async fn complete(
    pool: &PgPool,
    state: &AuthState,
    request: CompleteRequest,
) -> Result<(UserRecord, TokenPair), ApiError> {
    let email = validate::normalize_email(&request.email);
    let full_name = request.full_name.trim().to_string();

    let mut details = Vec::new();
    for check in [
        validate::check_email(&email),
        validate::check_otp(&request.otp),
        validate::check_password(&request.password),
        validate::check_full_name(&full_name),
        validate::check_username(&request.username),
    ] {
        if let Err(message) = check {
            details.push(message);
        }
    }
    if !details.is_empty() {
        return Err(ApiError::validation_with_details("Validation failed", details));
    }

    // The slow hash runs on a blocking thread before the transaction opens,
    // so no connection is held across it.
    let hasher = state.hasher();
    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .context("password hashing task failed")??;

    let mut tx = pool.begin().await.context("begin registration")?;

    let consumed = otp::verify(&mut tx, &email, &request.otp, otp::PURPOSE_VERIFICATION).await?;
    if !consumed {
        return Err(ApiError::validation("Invalid or expired OTP"));
    }

    if storage::username_exists(&mut tx, &request.username).await? {
        return Err(ApiError::Conflict("Username is already taken".to_string()));
    }

    let inserted = storage::insert_user(
        &mut tx,
        NewUser {
            email: &email,
            password_hash: &password_hash,
            full_name: &full_name,
            username: &request.username,
            branch: request.branch.as_deref(),
            year: request.year.as_deref(),
        },
    )
    .await?;

    let user = match inserted {
        UserInsert::Created(user) => *user,
        UserInsert::DuplicateEmail => {
            return Err(ApiError::Conflict(
                "User with this email already exists".to_string(),
            ));
        }
        UserInsert::DuplicateUsername => {
            return Err(ApiError::Conflict("Username is already taken".to_string()));
        }
    };

    let pair = state.tokens().issue_pair(user.id, &user.email)?;
    storage::insert_refresh_token(
        &mut tx,
        user.id,
        &pair.refresh,
        state.tokens().refresh_expires_at(),
    )
    .await?;

    tx.commit().await.context("commit registration")?;

    info!(user_id = %user.id, username = %user.username, "user registered");

    // Best effort; the account exists either way.
    if let Err(err) = state.mailer().send_welcome(&user.email, &user.full_name).await {
        warn!(to_email = %user.email, "welcome email failed: {err:#}");
    }

    Ok((user, pair))
}

/// Authenticate a password and open a session.
///
/// Unknown address, passwordless account, and wrong password all answer with
/// the same message so login cannot be used to probe for accounts.
///
/// # Errors
/// `Unauthorized` for any credential failure or a deactivated account.
pub async fn login(
    pool: &PgPool,
    state: &AuthState,
    request: LoginRequest,
) -> Result<(UserRecord, TokenPair), ApiError> {
    let email = validate::normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let Some(user) = storage::lookup_user_by_email(pool, &email).await? else {
        return Err(invalid());
    };
    let Some(password_hash) = user.password_hash.clone() else {
        return Err(invalid());
    };

    let hasher = state.hasher();
    let password = request.password;
    let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash))
        .await
        .context("password verification task failed")??;
    if !matches {
        return Err(invalid());
    }

    if !user.is_active {
        return Err(ApiError::Unauthorized("Account is deactivated".to_string()));
    }

    let pair = state.tokens().issue_pair(user.id, &user.email)?;

    let mut tx = pool.begin().await.context("begin login session")?;
    storage::insert_refresh_token(
        &mut tx,
        user.id,
        &pair.refresh,
        state.tokens().refresh_expires_at(),
    )
    .await?;
    tx.commit().await.context("commit login session")?;

    if let Err(err) = storage::update_last_seen(pool, user.id).await {
        warn!(user_id = %user.id, "last-seen update failed: {err:#}");
    }

    info!(user_id = %user.id, "user logged in");
    Ok((user, pair))
}

/// Load the authenticated user's profile with social-graph counts.
///
/// # Errors
/// `NotFound` if the row disappeared after the token was minted.
pub async fn me(pool: &PgPool, user_id: Uuid) -> Result<ProfileRecord, ApiError> {
    storage::profile_with_counts(pool, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}
