//! Database helpers for identities and refresh tokens.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Full identity row as needed by login and profile responses.
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) password_hash: Option<String>,
    pub(crate) full_name: String,
    pub(crate) username: String,
    pub(crate) avatar_url: Option<String>,
    pub(crate) bio: Option<String>,
    pub(crate) branch: Option<String>,
    pub(crate) year: Option<String>,
    pub(crate) is_verified: bool,
    pub(crate) is_active: bool,
    pub(crate) created_at: DateTime<Utc>,
}

/// Minimal identity data attached to authenticated requests.
pub(crate) struct IdentityRecord {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) is_active: bool,
}

/// Profile row plus social-graph counts for the current-user endpoint.
pub(crate) struct ProfileRecord {
    pub(crate) user: UserRecord,
    pub(crate) posts: i64,
    pub(crate) followers: i64,
    pub(crate) following: i64,
}

/// Outcome when inserting a new identity; uniqueness races surface here.
pub(crate) enum UserInsert {
    Created(Box<UserRecord>),
    DuplicateEmail,
    DuplicateUsername,
}

/// Column values for a new identity row.
pub(crate) struct NewUser<'a> {
    pub(crate) email: &'a str,
    pub(crate) password_hash: &'a str,
    pub(crate) full_name: &'a str,
    pub(crate) username: &'a str,
    pub(crate) branch: Option<&'a str>,
    pub(crate) year: Option<&'a str>,
}

const USER_COLUMNS: &str = "id, email, password_hash, full_name, username, avatar_url, bio, \
                            branch, year, is_verified, is_active, created_at";

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        username: row.get("username"),
        avatar_url: row.get("avatar_url"),
        bio: row.get("bio"),
        branch: row.get("branch"),
        year: row.get("year"),
        is_verified: row.get("is_verified"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }
}

pub(crate) async fn lookup_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    Ok(row.map(|row| user_from_row(&row)))
}

pub(crate) async fn email_exists(pool: &PgPool, email: &str) -> Result<bool> {
    let query = "SELECT 1 FROM users WHERE email = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check email existence")?;

    Ok(row.is_some())
}

pub(crate) async fn username_exists(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    username: &str,
) -> Result<bool> {
    let query = "SELECT 1 FROM users WHERE username = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to check username existence")?;

    Ok(row.is_some())
}

/// Insert a verified identity. Runs inside the registration transaction so a
/// failure after this point rolls the row back.
pub(crate) async fn insert_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    new_user: NewUser<'_>,
) -> Result<UserInsert> {
    let query = format!(
        "INSERT INTO users (email, password_hash, full_name, username, branch, year, is_verified) \
         VALUES ($1, $2, $3, $4, $5, $6, TRUE) \
         RETURNING {USER_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(new_user.email)
        .bind(new_user.password_hash)
        .bind(new_user.full_name)
        .bind(new_user.username)
        .bind(new_user.branch)
        .bind(new_user.year)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(UserInsert::Created(Box::new(user_from_row(&row)))),
        Err(err) => match unique_violation_constraint(&err) {
            Some(constraint) if constraint.contains("username") => {
                Ok(UserInsert::DuplicateUsername)
            }
            Some(_) => Ok(UserInsert::DuplicateEmail),
            None => Err(err).context("failed to insert user"),
        },
    }
}

pub(crate) async fn update_last_seen(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "UPDATE users SET last_seen_at = NOW(), updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update last seen timestamp")?;

    Ok(())
}

pub(crate) async fn lookup_identity(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<IdentityRecord>> {
    let query = "SELECT id, email, is_active FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup identity")?;

    Ok(row.map(|row| IdentityRecord {
        id: row.get("id"),
        email: row.get("email"),
        is_active: row.get("is_active"),
    }))
}

pub(crate) async fn insert_refresh_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let query = "INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert refresh token")?;

    Ok(())
}

/// Delete the presented refresh token row if it is still live.
///
/// Returns false when no unexpired row matched, which callers treat as an
/// invalid presentation.
pub(crate) async fn delete_refresh_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token: &str,
    user_id: Uuid,
) -> Result<bool> {
    let query = "DELETE FROM refresh_tokens \
                 WHERE token = $1 AND user_id = $2 AND expires_at > NOW()";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(token)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to delete refresh token")?;

    Ok(result.rows_affected() > 0)
}

/// Logout is idempotent; it's fine if no rows are deleted.
pub(crate) async fn delete_refresh_tokens_by_token(pool: &PgPool, token: &str) -> Result<()> {
    let query = "DELETE FROM refresh_tokens WHERE token = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete refresh tokens")?;

    Ok(())
}

pub(crate) async fn profile_with_counts(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<ProfileRecord>> {
    let query = format!(
        "SELECT {USER_COLUMNS}, \
           (SELECT COUNT(*) FROM posts WHERE author_id = users.id) AS posts_count, \
           (SELECT COUNT(*) FROM follows WHERE followee_id = users.id) AS followers_count, \
           (SELECT COUNT(*) FROM follows WHERE follower_id = users.id) AS following_count \
         FROM users WHERE id = $1"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load profile with counts")?;

    Ok(row.map(|row| ProfileRecord {
        posts: row.get("posts_count"),
        followers: row.get("followers_count"),
        following: row.get("following_count"),
        user: user_from_row(&row),
    }))
}

fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => Some(
            db_err
                .constraint()
                .map_or_else(String::new, ToString::to_string),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_requires_sqlstate() {
        assert!(unique_violation_constraint(&sqlx::Error::RowNotFound).is_none());
    }

    #[test]
    fn user_insert_variants_exist() {
        // Conflict variants carry no payload; they map straight to 409s.
        assert!(matches!(UserInsert::DuplicateEmail, UserInsert::DuplicateEmail));
        assert!(matches!(
            UserInsert::DuplicateUsername,
            UserInsert::DuplicateUsername
        ));
    }
}
