//! Disposable-email capability with a fail-open HTTP adapter.
//!
//! Registration asks this checker before creating an account. The fail-open
//! decision lives here, not in the core: any transport error, timeout, or
//! unexpected response shape means "not disposable" so checker downtime never
//! blocks signups.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[async_trait]
pub trait DisposableEmailChecker: Send + Sync {
    async fn is_disposable(&self, email: &str) -> bool;
}

/// Checker used when no external service is configured.
#[derive(Clone, Debug)]
pub struct NoopDisposableChecker;

#[async_trait]
impl DisposableEmailChecker for NoopDisposableChecker {
    async fn is_disposable(&self, _email: &str) -> bool {
        false
    }
}

#[derive(Debug, Deserialize)]
struct DisposableResponse {
    disposable: Option<bool>,
}

/// Checker backed by an external HTTP API: `GET {base_url}/{email}` returning
/// `{"disposable": bool}`.
#[derive(Clone, Debug)]
pub struct HttpDisposableChecker {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDisposableChecker {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn parse_response(value: &serde_json::Value) -> bool {
        serde_json::from_value::<DisposableResponse>(value.clone())
            .ok()
            .and_then(|response| response.disposable)
            .unwrap_or(false)
    }
}

#[async_trait]
impl DisposableEmailChecker for HttpDisposableChecker {
    async fn is_disposable(&self, email: &str) -> bool {
        let url = format!("{}/{}", self.base_url, email);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("disposable check unavailable, allowing: {err}");
                return false;
            }
        };

        match response.json::<serde_json::Value>().await {
            Ok(value) => Self::parse_response(&value),
            Err(err) => {
                warn!("disposable check returned unexpected body, allowing: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn noop_checker_allows_everything() {
        let checker = NoopDisposableChecker;
        assert!(!checker.is_disposable("anything@mailinator.com").await);
    }

    #[test]
    fn parse_response_reads_flag() {
        assert!(HttpDisposableChecker::parse_response(&json!({
            "disposable": true
        })));
        assert!(!HttpDisposableChecker::parse_response(&json!({
            "disposable": false
        })));
    }

    #[test]
    fn parse_response_fails_open_on_unexpected_shape() {
        assert!(!HttpDisposableChecker::parse_response(&json!({})));
        assert!(!HttpDisposableChecker::parse_response(&json!({
            "disposable": "yes"
        })));
        assert!(!HttpDisposableChecker::parse_response(&json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn unreachable_checker_fails_open() {
        // Reserved TEST-NET address; the request errors out quickly.
        let checker = HttpDisposableChecker::new("http://192.0.2.1:9".to_string());
        assert!(checker.is_ok());
        if let Ok(checker) = checker {
            assert!(!checker.is_disposable("user@example.com").await);
        }
    }
}
