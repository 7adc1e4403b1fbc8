//! OAuth federation: map a Google or GitHub profile onto an account.
//!
//! Token exchange happens on the client; this side receives the provider
//! access token, fetches the profile, and resolves it to an account. An
//! account created this way is born verified with no password; password login
//! stays closed until the user sets one through the reset flow.

use anyhow::Context;
use serde::Deserialize;
use sqlx::PgPool;
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::api::error::AuthError;

use super::storage::{self, AccountRecord, InsertOutcome, NewAccount};

const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Provider {
    Google,
    GitHub,
}

impl Provider {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "google" => Some(Self::Google),
            "github" => Some(Self::GitHub),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized provider profile, the only shape the account path sees.
#[derive(Clone, Debug)]
pub(crate) struct ProviderProfile {
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) avatar_url: Option<String>,
    pub(crate) provider: Provider,
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: Option<String>,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

fn google_profile_from(user: GoogleUser) -> Result<ProviderProfile, AuthError> {
    let Some(email) = user.email else {
        return Err(AuthError::BadRequest(
            "Google profile is missing an email address".to_string(),
        ));
    };
    let Some(name) = user.name else {
        return Err(AuthError::BadRequest(
            "Google profile is missing a display name".to_string(),
        ));
    };
    Ok(ProviderProfile {
        email,
        display_name: name,
        avatar_url: user.picture,
        provider: Provider::Google,
    })
}

/// Pick the address GitHub considers primary, else the first verified one,
/// else the first listed.
fn pick_github_email(emails: &[GitHubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|entry| entry.primary)
        .or_else(|| emails.iter().find(|entry| entry.verified))
        .or_else(|| emails.first())
        .map(|entry| entry.email.clone())
}

fn github_profile_from(
    user: GitHubUser,
    fallback_emails: Option<&[GitHubEmail]>,
) -> Result<ProviderProfile, AuthError> {
    let email = user
        .email
        .or_else(|| fallback_emails.and_then(pick_github_email))
        .ok_or_else(|| {
            AuthError::NotFound("No email address available from GitHub".to_string())
        })?;

    let display_name = user.name.or(user.login).ok_or_else(|| {
        AuthError::BadRequest("GitHub profile is missing a display name".to_string())
    })?;

    Ok(ProviderProfile {
        email,
        display_name,
        avatar_url: user.avatar_url,
        provider: Provider::GitHub,
    })
}

/// HTTP client for provider profile endpoints.
pub(crate) struct ProviderClient {
    client: reqwest::Client,
}

impl ProviderClient {
    pub(crate) fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build provider HTTP client")?;
        Ok(Self { client })
    }

    /// Fetch and normalize the profile behind a provider access token.
    pub(crate) async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<ProviderProfile, AuthError> {
        match provider {
            Provider::Google => {
                let user: GoogleUser = self
                    .get_json(GOOGLE_USERINFO_URL, access_token)
                    .await
                    .map_err(AuthError::Internal)?;
                google_profile_from(user)
            }
            Provider::GitHub => {
                let user: GitHubUser = self
                    .get_json(GITHUB_USER_URL, access_token)
                    .await
                    .map_err(AuthError::Internal)?;

                // Users can hide their email on the public profile; the
                // emails endpoint still lists it for the token's owner.
                let emails = if user.email.is_none() {
                    Some(
                        self.get_json::<Vec<GitHubEmail>>(GITHUB_EMAILS_URL, access_token)
                            .await
                            .unwrap_or_default(),
                    )
                } else {
                    None
                };
                github_profile_from(user, emails.as_deref())
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> anyhow::Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("provider request failed: {url}"))?;

        let response = response
            .error_for_status()
            .with_context(|| format!("provider returned an error status: {url}"))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("provider returned an unexpected body: {url}"))
    }
}

/// Look up the account for this profile, creating it on first login.
/// A repeat login returns the stored account unchanged.
pub(crate) async fn resolve_or_create(
    pool: &PgPool,
    profile: &ProviderProfile,
    service_id: &str,
) -> Result<AccountRecord, AuthError> {
    if let Some(account) = storage::find_account_by_email(pool, &profile.email, service_id).await? {
        return Ok(account);
    }

    let outcome = storage::insert_account(
        pool,
        &NewAccount {
            name: &profile.display_name,
            email: &profile.email,
            phone: None,
            avatar_url: profile.avatar_url.as_deref(),
            service_id,
            password_hash: None,
            verified: true,
            provider: Some(profile.provider.as_str()),
            verification_token_hash: None,
            verification_ttl_seconds: 0,
        },
    )
    .await?;

    match outcome {
        InsertOutcome::Created(account) => {
            info!(
                user_id = %account.id,
                provider = %profile.provider,
                "created account from provider profile"
            );
            Ok(account)
        }
        // Lost a creation race; the winner's row is the account.
        InsertOutcome::Conflict => storage::find_account_by_email(pool, &profile.email, service_id)
            .await?
            .ok_or_else(|| AuthError::Conflict("Email is already registered".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parse_round_trip() {
        assert_eq!(Provider::parse("google"), Some(Provider::Google));
        assert_eq!(Provider::parse("github"), Some(Provider::GitHub));
        assert_eq!(Provider::parse("gitlab"), None);
        assert_eq!(Provider::Google.as_str(), "google");
    }

    #[test]
    fn google_profile_requires_email_and_name() {
        let user = GoogleUser {
            email: None,
            name: Some("Alice".to_string()),
            picture: None,
        };
        assert!(matches!(
            google_profile_from(user),
            Err(AuthError::BadRequest(_))
        ));

        let user = GoogleUser {
            email: Some("alice@example.com".to_string()),
            name: None,
            picture: None,
        };
        assert!(matches!(
            google_profile_from(user),
            Err(AuthError::BadRequest(_))
        ));

        let user = GoogleUser {
            email: Some("alice@example.com".to_string()),
            name: Some("Alice".to_string()),
            picture: Some("https://example.com/a.png".to_string()),
        };
        let profile = google_profile_from(user);
        assert!(profile.is_ok());
        if let Ok(profile) = profile {
            assert_eq!(profile.email, "alice@example.com");
            assert_eq!(profile.provider, Provider::Google);
        }
    }

    #[test]
    fn github_email_prefers_primary() {
        let emails = vec![
            GitHubEmail {
                email: "old@example.com".to_string(),
                primary: false,
                verified: true,
            },
            GitHubEmail {
                email: "main@example.com".to_string(),
                primary: true,
                verified: true,
            },
        ];
        assert_eq!(
            pick_github_email(&emails),
            Some("main@example.com".to_string())
        );
    }

    #[test]
    fn github_email_falls_back_to_first() {
        let emails = vec![
            GitHubEmail {
                email: "a@example.com".to_string(),
                primary: false,
                verified: false,
            },
            GitHubEmail {
                email: "b@example.com".to_string(),
                primary: false,
                verified: false,
            },
        ];
        assert_eq!(pick_github_email(&emails), Some("a@example.com".to_string()));
        assert_eq!(pick_github_email(&[]), None);
    }

    #[test]
    fn github_profile_uses_login_when_name_hidden() {
        let user = GitHubUser {
            login: Some("octocat".to_string()),
            name: None,
            email: Some("octo@example.com".to_string()),
            avatar_url: None,
        };
        let profile = github_profile_from(user, None);
        assert!(profile.is_ok());
        if let Ok(profile) = profile {
            assert_eq!(profile.display_name, "octocat");
        }
    }

    #[test]
    fn github_profile_without_any_email_is_not_found() {
        let user = GitHubUser {
            login: Some("octocat".to_string()),
            name: Some("Octo Cat".to_string()),
            email: None,
            avatar_url: None,
        };
        assert!(matches!(
            github_profile_from(user, Some(&[])),
            Err(AuthError::NotFound(_))
        ));
    }
}
