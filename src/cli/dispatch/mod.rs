//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let jwt_secret = matches
        .get_one::<String>("jwt-secret")
        .cloned()
        .context("missing required argument: --jwt-secret")?;
    let frontend_base_url = matches
        .get_one::<String>("frontend-base-url")
        .cloned()
        .context("missing required argument: --frontend-base-url")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret,
        frontend_base_url,
        max_failed_logins: matches
            .get_one::<u32>("max-failed-logins")
            .copied()
            .unwrap_or(5),
        lockout_duration_seconds: matches
            .get_one::<i64>("lockout-duration-seconds")
            .copied()
            .unwrap_or(900),
        access_token_ttl_seconds: matches
            .get_one::<i64>("access-token-ttl-seconds")
            .copied()
            .unwrap_or(900),
        refresh_token_ttl_seconds: matches
            .get_one::<i64>("refresh-token-ttl-seconds")
            .copied()
            .unwrap_or(2_592_000),
        email_token_ttl_seconds: matches
            .get_one::<i64>("email-token-ttl-seconds")
            .copied()
            .unwrap_or(1800),
        reset_token_ttl_seconds: matches
            .get_one::<i64>("reset-token-ttl-seconds")
            .copied()
            .unwrap_or(1800),
        resend_cooldown_seconds: matches
            .get_one::<i64>("resend-cooldown-seconds")
            .copied()
            .unwrap_or(60),
        hash_memory_kib: matches
            .get_one::<u32>("hash-memory-kib")
            .copied()
            .unwrap_or(19456),
        hash_iterations: matches
            .get_one::<u32>("hash-iterations")
            .copied()
            .unwrap_or(2),
        disposable_check_url: matches.get_one::<String>("disposable-check-url").cloned(),
    }))
}
