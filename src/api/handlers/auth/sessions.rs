//! Session lifecycle: token-pair issuance, refresh rotation, revocation.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::api::error::AuthError;

use super::session_store::{self, NewSession};
use super::state::AuthState;
use super::storage;
use super::tokens::{generate_token, hash_token};

/// Access token plus its paired refresh token. The access token is never
/// persisted; the refresh token is persisted as a digest only.
#[derive(Debug)]
pub(crate) struct TokenPair {
    pub(crate) access_token: String,
    pub(crate) refresh_token: String,
    pub(crate) expires_in: i64,
}

/// Request-scoped client context attached to a session row.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SessionContext<'a> {
    pub(crate) device_id: Option<&'a str>,
    pub(crate) user_agent: Option<&'a str>,
    pub(crate) ip_address: Option<&'a str>,
}

/// Create a refresh-token session and return the plaintext token. For a
/// known device this overwrites that device's prior session, invalidating
/// its old refresh token.
pub(crate) async fn create_session(
    pool: &PgPool,
    state: &AuthState,
    user_id: Uuid,
    context: SessionContext<'_>,
) -> Result<String, AuthError> {
    let refresh_token = generate_token().map_err(AuthError::Internal)?;
    let refresh_hash = hash_token(&refresh_token);

    session_store::upsert_session(
        pool,
        &NewSession {
            user_id,
            device_id: context.device_id,
            refresh_token_hash: &refresh_hash,
            user_agent: context.user_agent,
            ip_address: context.ip_address,
            ttl_seconds: state.config().refresh_token_ttl_seconds(),
        },
    )
    .await?;

    Ok(refresh_token)
}

/// Sign a fresh access token and create the matching refresh session.
pub(crate) async fn generate_token_pair(
    pool: &PgPool,
    state: &AuthState,
    user_id: Uuid,
    email: &str,
    service_id: &str,
    context: SessionContext<'_>,
) -> Result<TokenPair, AuthError> {
    let access_token = state
        .signer()
        .sign(user_id, email, service_id)
        .map_err(|err| AuthError::Internal(err.into()))?;
    let refresh_token = create_session(pool, state, user_id, context).await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        expires_in: state.config().access_token_ttl_seconds(),
    })
}

/// Exchange a refresh token for a new token pair. The presented token is
/// consumed: its row is deleted and a new one created inside the same
/// transaction, so the old value can never refresh twice.
pub(crate) async fn refresh_access_token(
    pool: &PgPool,
    state: &AuthState,
    refresh_token: &str,
    context: SessionContext<'_>,
) -> Result<TokenPair, AuthError> {
    let presented_hash = hash_token(refresh_token);
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| AuthError::Internal(err.into()))?;

    let Some(session) = session_store::find_by_refresh_hash(&mut tx, &presented_hash).await? else {
        return Err(AuthError::InvalidOrExpiredToken);
    };

    let Some(account) = storage::find_account_by_id(pool, session.user_id).await? else {
        // Session outlived its account; treat as an integrity fault.
        return Err(AuthError::NotFound("Account not found".to_string()));
    };

    session_store::delete_session(&mut tx, session.session_id).await?;

    let new_refresh = generate_token().map_err(AuthError::Internal)?;
    let new_hash = hash_token(&new_refresh);
    session_store::insert_session(
        &mut tx,
        &NewSession {
            user_id: account.id,
            device_id: context.device_id.or(session.device_id.as_deref()),
            refresh_token_hash: &new_hash,
            user_agent: context.user_agent.or(session.user_agent.as_deref()),
            ip_address: context.ip_address.or(session.ip_address.as_deref()),
            ttl_seconds: state.config().refresh_token_ttl_seconds(),
        },
    )
    .await?;

    let access_token = state
        .signer()
        .sign(account.id, &account.email, &account.service_id)
        .map_err(|err| AuthError::Internal(err.into()))?;

    tx.commit()
        .await
        .map_err(|err| AuthError::Internal(err.into()))?;

    info!(user_id = %account.id, "refresh token rotated");
    Ok(TokenPair {
        access_token,
        refresh_token: new_refresh,
        expires_in: state.config().access_token_ttl_seconds(),
    })
}

/// Revoke the session holding this refresh token; unknown tokens no-op.
pub(crate) async fn revoke_by_refresh_token(
    pool: &PgPool,
    refresh_token: &str,
) -> Result<(), AuthError> {
    let hash = hash_token(refresh_token);
    let removed = session_store::delete_by_refresh_hash(pool, &hash).await?;
    if removed {
        info!("session revoked via refresh token");
    }
    Ok(())
}

/// Revoke the one session for (user, device); no-op when absent.
pub(crate) async fn revoke_session(
    pool: &PgPool,
    user_id: Uuid,
    device_id: &str,
) -> Result<(), AuthError> {
    let removed = session_store::delete_for_device(pool, user_id, device_id).await?;
    if removed {
        info!(user_id = %user_id, "device session revoked");
    }
    Ok(())
}

/// Revoke every session for the account.
pub(crate) async fn revoke_all_sessions(pool: &PgPool, user_id: Uuid) -> Result<u64, AuthError> {
    let removed = session_store::delete_all_for_user(pool, user_id).await?;
    info!(user_id = %user_id, removed, "all sessions revoked");
    Ok(removed)
}
