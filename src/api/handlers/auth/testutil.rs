//! Shared support for tests that need a live database.
//!
//! Set `DATABASE_URL` to a Postgres instance to run them; without it each
//! test returns early after the `Some` check. Migrations are applied on
//! connect, and every test uses throwaway addresses so runs do not collide.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::disposable::NoopDisposableChecker;
use crate::api::email::LogEmailSender;

use super::jwt::TokenSigner;
use super::state::{AuthConfig, AuthState};

pub(crate) async fn database_pool() -> Option<PgPool> {
    let dsn = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&dsn)
        .await
        .ok()?;
    sqlx::migrate!("./migrations").run(&pool).await.ok()?;
    Some(pool)
}

/// Fresh address per call so reruns never trip the uniqueness constraint.
pub(crate) fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4())
}

/// State with the cheapest usable hash cost; production defaults make
/// repeated logins in a test painfully slow.
pub(crate) fn database_test_state() -> Arc<AuthState> {
    Arc::new(AuthState::new(
        AuthConfig::new("https://accesso.dev".to_string())
            .with_hash_memory_kib(8 * 1024)
            .with_hash_iterations(1)
            .with_max_failed_logins(3),
        TokenSigner::new(secrecy::SecretString::from("test-secret"), 900),
        Arc::new(LogEmailSender),
        Arc::new(NoopDisposableChecker),
    ))
}
