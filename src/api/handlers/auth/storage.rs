//! Database helpers for accounts, credential state, and lockout state.
//!
//! All helpers return `anyhow::Result`; the service layer translates outcomes
//! into the typed error taxonomy. Multi-step state changes that must not be
//! observed partially (signup, verification promote+flag, password reset,
//! archival) run inside a single transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use super::lockout::LockoutUpdate;

/// Identity root as stored in `users`.
#[derive(Clone, Debug)]
pub struct AccountRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub service_id: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Everything `authenticate` needs in one lookup.
pub(crate) struct LoginState {
    pub(crate) account: AccountRecord,
    pub(crate) verified: bool,
    pub(crate) provider: Option<String>,
    pub(crate) password_hash: Option<String>,
    pub(crate) locked_until: Option<DateTime<Utc>>,
    pub(crate) failed_attempts: i32,
}

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub(crate) enum InsertOutcome {
    Created(AccountRecord),
    Conflict,
}

/// Existing account matched during a uniqueness check. The token expiry lets
/// callers tell a live pending signup from an abandoned one.
pub(crate) struct ExistingAccount {
    pub(crate) user_id: Uuid,
    pub(crate) verified: bool,
    pub(crate) token_expires_at: Option<DateTime<Utc>>,
}

/// Fields for a new account row plus its satellite records.
pub(crate) struct NewAccount<'a> {
    pub(crate) name: &'a str,
    pub(crate) email: &'a str,
    pub(crate) phone: Option<&'a str>,
    pub(crate) avatar_url: Option<&'a str>,
    pub(crate) service_id: &'a str,
    pub(crate) password_hash: Option<&'a str>,
    pub(crate) verified: bool,
    pub(crate) provider: Option<&'a str>,
    pub(crate) verification_token_hash: Option<&'a [u8]>,
    pub(crate) verification_ttl_seconds: i64,
}

fn account_from_row(row: &sqlx::postgres::PgRow) -> AccountRecord {
    AccountRecord {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        avatar_url: row.get("avatar_url"),
        service_id: row.get("service_id"),
        is_active: row.get("is_active"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

const ACCOUNT_COLUMNS: &str = "id, name, email, phone, avatar_url, service_id, is_active, \
                               last_login_at, created_at";

/// Look up an account with its verification state for a uniqueness check.
pub(crate) async fn find_existing_account(
    pool: &PgPool,
    email: &str,
    service_id: &str,
) -> Result<Option<ExistingAccount>> {
    let query = r"
        SELECT users.id, email_credentials.verified, email_credentials.token_expires_at
        FROM users
        JOIN email_credentials ON email_credentials.user_id = users.id
        WHERE users.email = $1
          AND users.service_id = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(service_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup existing account")?;

    Ok(row.map(|row| ExistingAccount {
        user_id: row.get("id"),
        verified: row.get("verified"),
        token_expires_at: row.get("token_expires_at"),
    }))
}

pub(crate) async fn find_account_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<AccountRecord>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1");
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
        .context("failed to lookup account by id")?;
    Ok(row.map(|row| account_from_row(&row)))
}

pub(crate) async fn find_account_by_email(
    pool: &PgPool,
    email: &str,
    service_id: &str,
) -> Result<Option<AccountRecord>> {
    let query =
        format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1 AND service_id = $2 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(email)
        .bind(service_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account by email")?;
    Ok(row.map(|row| account_from_row(&row)))
}

/// Delete an account; satellite rows and sessions cascade.
pub(crate) async fn delete_account(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "DELETE FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete account")?;
    Ok(())
}

/// Create the account and all three satellite rows in one transaction.
/// A concurrent duplicate surfaces as [`InsertOutcome::Conflict`].
pub(crate) async fn insert_account(pool: &PgPool, new: &NewAccount<'_>) -> Result<InsertOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = format!(
        r"
        INSERT INTO users (name, email, phone, avatar_url, service_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {ACCOUNT_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(new.name)
        .bind(new.email)
        .bind(new.phone)
        .bind(new.avatar_url)
        .bind(new.service_id)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let account = match row {
        Ok(row) => account_from_row(&row),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(InsertOutcome::Conflict);
            }
            return Err(err).context("failed to insert account");
        }
    };

    let query = r"
        INSERT INTO email_credentials (user_id, verified, token_hash, token_expires_at, provider)
        VALUES ($1, $2, $3,
                CASE WHEN $3 IS NULL THEN NULL
                     ELSE NOW() + ($4 * INTERVAL '1 second') END,
                $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account.id)
        .bind(new.verified)
        .bind(new.verification_token_hash)
        .bind(new.verification_ttl_seconds)
        .bind(new.provider)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert email credential state")?;

    let query = "INSERT INTO password_credentials (user_id, password_hash) VALUES ($1, $2)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account.id)
        .bind(new.password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert password credential state")?;

    let query = "INSERT INTO lockout_states (user_id) VALUES ($1)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account.id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert lockout state")?;

    tx.commit().await.context("commit signup transaction")?;

    Ok(InsertOutcome::Created(account))
}

/// Full join used by password login.
pub(crate) async fn find_login_state(
    pool: &PgPool,
    email: &str,
    service_id: &str,
) -> Result<Option<LoginState>> {
    let query = r"
        SELECT users.id, users.name, users.email, users.phone, users.avatar_url,
               users.service_id, users.is_active, users.last_login_at, users.created_at,
               email_credentials.verified, email_credentials.provider,
               password_credentials.password_hash,
               lockout_states.locked_until, lockout_states.failed_attempts
        FROM users
        JOIN email_credentials ON email_credentials.user_id = users.id
        JOIN password_credentials ON password_credentials.user_id = users.id
        LEFT JOIN lockout_states ON lockout_states.user_id = users.id
        WHERE users.email = $1
          AND users.service_id = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(service_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup login state")?;

    Ok(row.map(|row| LoginState {
        account: account_from_row(&row),
        verified: row.get("verified"),
        provider: row.get("provider"),
        password_hash: row.get("password_hash"),
        locked_until: row.get("locked_until"),
        failed_attempts: row.try_get("failed_attempts").unwrap_or(0),
    }))
}

/// Persist a failed-login decision. First failure creates the row; below the
/// threshold an existing future lock is left untouched.
pub(crate) async fn upsert_lockout(
    pool: &PgPool,
    user_id: Uuid,
    update: LockoutUpdate,
) -> Result<()> {
    let query = r"
        INSERT INTO lockout_states (user_id, locked, locked_until, failed_attempts)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id) DO UPDATE
        SET failed_attempts = $4,
            locked = $2,
            locked_until = COALESCE($3, lockout_states.locked_until)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(update.locked)
        .bind(update.locked_until)
        .bind(update.failed_attempts)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to upsert lockout state")?;
    Ok(())
}

pub(crate) async fn reset_lockout(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("begin lockout reset")?;
    clear_lockout(&mut tx, user_id).await?;
    tx.commit().await.context("commit lockout reset")?;
    Ok(())
}

pub(crate) async fn clear_lockout(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> Result<()> {
    let query = r"
        INSERT INTO lockout_states (user_id, locked, locked_until, failed_attempts)
        VALUES ($1, FALSE, NULL, 0)
        ON CONFLICT (user_id) DO UPDATE
        SET failed_attempts = 0,
            locked = FALSE,
            locked_until = NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to clear lockout state")?;
    Ok(())
}

pub(crate) async fn record_login(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1";
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
        .context("failed to record login timestamp")?;
    Ok(())
}

/// Pending verification matched by token digest.
pub(crate) struct VerificationMatch {
    pub(crate) user_id: Uuid,
    pub(crate) service_id: String,
    pub(crate) pending_email: Option<String>,
}

pub(crate) async fn lookup_verification(
    tx: &mut Transaction<'_, Postgres>,
    token_hash: &[u8],
) -> Result<Option<VerificationMatch>> {
    let query = r"
        SELECT users.id, users.service_id, email_credentials.pending_email
        FROM email_credentials
        JOIN users ON users.id = email_credentials.user_id
        WHERE email_credentials.token_hash = $1
          AND email_credentials.token_expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup verification token")?;

    Ok(row.map(|row| VerificationMatch {
        user_id: row.get("id"),
        service_id: row.get("service_id"),
        pending_email: row.get("pending_email"),
    }))
}

pub(crate) async fn email_taken_by_other(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    service_id: &str,
    user_id: Uuid,
) -> Result<bool> {
    let query = r"
        SELECT 1 FROM users
        WHERE email = $1
          AND service_id = $2
          AND id <> $3
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(service_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to check pending email uniqueness")?;
    Ok(row.is_some())
}

/// Promote the pending email (if any), flip `verified`, and clear the token.
/// One atomic unit: a crash cannot leave the email changed but unverified.
pub(crate) async fn apply_verification(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    pending_email: Option<&str>,
) -> Result<()> {
    if let Some(email) = pending_email {
        let query = "UPDATE users SET email = $2, updated_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(email)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to promote pending email")?;
    }

    let query = r"
        UPDATE email_credentials
        SET verified = TRUE,
            token_hash = NULL,
            token_expires_at = NULL,
            pending_email = NULL
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to mark email verified")?;
    Ok(())
}

/// Rotate the verification token for an unverified account, respecting the
/// resend cooldown. Returns `false` when inside the cooldown window.
pub(crate) async fn rotate_verification_token(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
    cooldown_seconds: i64,
) -> Result<bool> {
    // A token issued less than `cooldown` ago still has more than
    // `ttl - cooldown` seconds of life left; skip the rotation in that case.
    let query = r"
        UPDATE email_credentials
        SET token_hash = $2,
            token_expires_at = NOW() + ($3 * INTERVAL '1 second')
        WHERE user_id = $1
          AND verified = FALSE
          AND (token_expires_at IS NULL
               OR token_expires_at <= NOW() + (($3 - $4) * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds)
        .bind(cooldown_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to rotate verification token")?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn set_reset_token(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO password_credentials (user_id, reset_token_hash, reset_token_expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        ON CONFLICT (user_id) DO UPDATE
        SET reset_token_hash = $2,
            reset_token_expires_at = NOW() + ($3 * INTERVAL '1 second')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to set reset token")?;
    Ok(())
}

pub(crate) async fn lookup_reset(
    tx: &mut Transaction<'_, Postgres>,
    token_hash: &[u8],
) -> Result<Option<Uuid>> {
    let query = r"
        SELECT user_id FROM password_credentials
        WHERE reset_token_hash = $1
          AND reset_token_expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup reset token")?;
    Ok(row.map(|row| row.get("user_id")))
}

/// Store the new hash, clear the reset token, clear lockout, mark the email
/// verified, and drop every session. The reset token proved mailbox
/// possession, so all of this happens in the one transaction.
pub(crate) async fn apply_password_reset(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = r"
        UPDATE password_credentials
        SET password_hash = $2,
            reset_token_hash = NULL,
            reset_token_expires_at = NULL
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to store new password hash")?;

    clear_lockout(tx, user_id).await?;

    let query = "UPDATE email_credentials SET verified = TRUE WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to mark email verified after reset")?;

    let query = "DELETE FROM sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to revoke sessions after reset")?;

    Ok(())
}

pub(crate) async fn update_contact_fields(
    pool: &PgPool,
    user_id: Uuid,
    name: Option<&str>,
    phone: Option<&str>,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET name = COALESCE($2, name),
            phone = COALESCE($3, phone),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(name)
        .bind(phone)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update contact fields")?;
    Ok(())
}

pub(crate) async fn stage_pending_email(
    pool: &PgPool,
    user_id: Uuid,
    pending_email: &str,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        UPDATE email_credentials
        SET pending_email = $2,
            token_hash = $3,
            token_expires_at = NOW() + ($4 * INTERVAL '1 second')
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(pending_email)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to stage pending email")?;
    Ok(())
}

/// Compensating update when the verification email could not be sent.
pub(crate) async fn clear_pending_email(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE email_credentials
        SET pending_email = NULL,
            token_hash = NULL,
            token_expires_at = NULL
        WHERE user_id = $1
    ";
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
        .context("failed to clear pending email")?;
    Ok(())
}

pub(crate) async fn set_password_hash(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = "UPDATE password_credentials SET password_hash = $2 WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to set password hash")?;
    Ok(())
}

/// Archive identifying fields, then hard-delete the account. Sessions and
/// satellite rows go with the cascade. Returns `false` if the account was
/// already gone.
pub(crate) async fn archive_and_delete(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin account deletion")?;

    let query = r"
        INSERT INTO inactive_users (user_id, name, email, service_id)
        SELECT id, name, email, service_id FROM users WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let archived = sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to archive account")?;

    if archived.rows_affected() == 0 {
        let _ = tx.rollback().await;
        return Ok(false);
    }

    let query = "DELETE FROM sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete sessions for account")?;

    let query = "DELETE FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete account")?;

    tx.commit().await.context("commit account deletion")?;
    Ok(true)
}
