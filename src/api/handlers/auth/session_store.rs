//! Refresh-token session persistence.
//!
//! One row per (user, device); a login from a known device replaces that
//! device's session instead of piling up rows. Sessions without a device id
//! are always inserted fresh, so anonymous clients can hold several sessions
//! in parallel. Only the SHA-256 digest of the refresh token is stored.

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

/// A stored session matched by refresh-token digest.
pub(crate) struct SessionMatch {
    pub(crate) session_id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) device_id: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) ip_address: Option<String>,
}

/// Fields for a new session row.
pub(crate) struct NewSession<'a> {
    pub(crate) user_id: Uuid,
    pub(crate) device_id: Option<&'a str>,
    pub(crate) refresh_token_hash: &'a [u8],
    pub(crate) user_agent: Option<&'a str>,
    pub(crate) ip_address: Option<&'a str>,
    pub(crate) ttl_seconds: i64,
}

/// Insert a session, replacing any prior session for the same device.
/// Postgres unique indexes treat NULLs as distinct, so device-less sessions
/// never conflict with each other.
pub(crate) async fn upsert_session(pool: &PgPool, new: &NewSession<'_>) -> Result<Uuid> {
    let mut tx = pool.begin().await.context("begin session upsert")?;
    let id = insert_session(&mut tx, new).await?;
    tx.commit().await.context("commit session upsert")?;
    Ok(id)
}

pub(crate) async fn insert_session(
    tx: &mut Transaction<'_, Postgres>,
    new: &NewSession<'_>,
) -> Result<Uuid> {
    let query = r"
        INSERT INTO sessions
            (user_id, device_id, refresh_token_hash, user_agent, ip_address, expires_at)
        VALUES ($1, $2, $3, $4, $5, NOW() + ($6 * INTERVAL '1 second'))
        ON CONFLICT (user_id, device_id) DO UPDATE
        SET refresh_token_hash = $3,
            user_agent = $4,
            ip_address = $5,
            expires_at = NOW() + ($6 * INTERVAL '1 second'),
            updated_at = NOW()
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(new.user_id)
        .bind(new.device_id)
        .bind(new.refresh_token_hash)
        .bind(new.user_agent)
        .bind(new.ip_address)
        .bind(new.ttl_seconds)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert session")?;
    Ok(row.get("id"))
}

/// Find a live session by refresh-token digest. Expired rows never match.
pub(crate) async fn find_by_refresh_hash(
    tx: &mut Transaction<'_, Postgres>,
    refresh_token_hash: &[u8],
) -> Result<Option<SessionMatch>> {
    let query = r"
        SELECT id, user_id, device_id, user_agent, ip_address
        FROM sessions
        WHERE refresh_token_hash = $1
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(refresh_token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup session by refresh token")?;

    Ok(row.map(|row| SessionMatch {
        session_id: row.get("id"),
        user_id: row.get("user_id"),
        device_id: row.get("device_id"),
        user_agent: row.get("user_agent"),
        ip_address: row.get("ip_address"),
    }))
}

pub(crate) async fn delete_session(tx: &mut Transaction<'_, Postgres>, session_id: Uuid) -> Result<()> {
    let query = "DELETE FROM sessions WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// Delete the session holding this refresh token. Returns `true` when a row
/// was removed.
pub(crate) async fn delete_by_refresh_hash(
    pool: &PgPool,
    refresh_token_hash: &[u8],
) -> Result<bool> {
    let query = "DELETE FROM sessions WHERE refresh_token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(refresh_token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session by refresh token")?;
    Ok(result.rows_affected() > 0)
}

/// Delete the one session for (user, device); no-op when absent.
pub(crate) async fn delete_for_device(
    pool: &PgPool,
    user_id: Uuid,
    device_id: &str,
) -> Result<bool> {
    let query = "DELETE FROM sessions WHERE user_id = $1 AND device_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(device_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session for device")?;
    Ok(result.rows_affected() > 0)
}

/// Drop every session for the account. Returns the number of sessions
/// removed.
pub(crate) async fn delete_all_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64> {
    let query = "DELETE FROM sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete sessions for user")?;
    Ok(result.rows_affected())
}
