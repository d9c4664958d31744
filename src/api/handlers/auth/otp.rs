//! Six-digit verification codes bound to an email address and a purpose.
//!
//! At most one live code exists per (email, purpose): issuance deletes every
//! prior row for the pair before inserting the new one. Consumption is a
//! single conditional `UPDATE`, so a code can never match twice and callers
//! cannot tell a wrong code from an expired or already-used one.

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::PgPool;
use tracing::Instrument;

pub(crate) const PURPOSE_VERIFICATION: &str = "verification";

/// Uniformly random six-digit code (100000-999999, never fewer digits).
pub(crate) fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Issue a fresh code for (email, purpose) and return the plaintext for
/// out-of-band delivery. Prior codes for the pair are removed in the same
/// transaction, so concurrent issuance cannot leave two live codes.
pub(crate) async fn issue(
    pool: &PgPool,
    email: &str,
    purpose: &str,
    ttl_minutes: i64,
) -> Result<String> {
    let code = generate_code();

    let mut tx = pool.begin().await.context("begin code issuance")?;

    let query = "DELETE FROM otp_codes WHERE email = $1 AND purpose = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(purpose)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete previous codes")?;

    let query = "INSERT INTO otp_codes (email, code, purpose, expires_at) \
                 VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 minute'))";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(&code)
        .bind(purpose)
        .bind(ttl_minutes)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert verification code")?;

    tx.commit().await.context("commit code issuance")?;

    Ok(code)
}

/// Consume a live code matching all three fields inside the caller's
/// transaction. Returns false for wrong, expired, and already-used codes
/// alike.
pub(crate) async fn verify(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    email: &str,
    code: &str,
    purpose: &str,
) -> Result<bool> {
    let query = "UPDATE otp_codes \
                 SET consumed_at = NOW() \
                 WHERE email = $1 \
                   AND code = $2 \
                   AND purpose = $3 \
                   AND consumed_at IS NULL \
                   AND expires_at > NOW() \
                 RETURNING id";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(code)
        .bind(purpose)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume verification code")?;

    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn generated_codes_vary() {
        let first = generate_code();
        let varies = (0..20).any(|_| generate_code() != first);
        assert!(varies, "1-in-900000^20 odds say this should never fail");
    }
}
