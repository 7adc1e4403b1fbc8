//! Email delivery abstraction and message builders.
//!
//! The core treats the sender as a collaborator: a failed send fails the
//! request it belongs to, except where the calling flow performs an explicit
//! compensating rollback (pending email change). The default sender for local
//! dev is [`LogEmailSender`], which logs and returns `Ok(())`.

use anyhow::Result;
use tracing::info;

/// One outbound message: subject plus HTML and plain-text bodies.
#[derive(Clone, Debug)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error so the caller can fail or
    /// compensate.
    fn send(&self, to: &str, content: &EmailContent) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, to: &str, content: &EmailContent) -> Result<()> {
        info!(
            to_email = %to,
            subject = %content.subject,
            text = %content.text,
            "email send stub"
        );
        Ok(())
    }
}

/// Build the frontend verification link included in outbound emails.
pub(crate) fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email#token={token}")
}

/// Build the reset link; `redirect_url` tells the frontend where to land after
/// a successful reset.
pub(crate) fn build_reset_url(frontend_base_url: &str, token: &str, redirect_url: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    let redirect: String = url::form_urlencoded::byte_serialize(redirect_url.as_bytes()).collect();
    format!("{base}/reset-password?redirect={redirect}#token={token}")
}

pub(crate) fn verification_email(verify_url: &str) -> EmailContent {
    EmailContent {
        subject: "Verify your email address".to_string(),
        html: format!(
            "<p>Welcome! Confirm your email address by opening the link below.</p>\
             <p><a href=\"{verify_url}\">Verify email</a></p>"
        ),
        text: format!("Welcome! Confirm your email address: {verify_url}"),
    }
}

pub(crate) fn reset_email(reset_url: &str) -> EmailContent {
    EmailContent {
        subject: "Reset your password".to_string(),
        html: format!(
            "<p>A password reset was requested for your account. \
             If this was you, open the link below.</p>\
             <p><a href=\"{reset_url}\">Reset password</a></p>"
        ),
        text: format!("A password reset was requested for your account: {reset_url}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_verify_url_trims_trailing_slash() {
        let url = build_verify_url("https://accesso.dev/", "token");
        assert_eq!(url, "https://accesso.dev/verify-email#token=token");
    }

    #[test]
    fn build_reset_url_encodes_redirect() {
        let url = build_reset_url(
            "https://accesso.dev",
            "tok",
            "https://app.example.com/done?x=1",
        );
        assert!(url.starts_with("https://accesso.dev/reset-password?redirect="));
        assert!(url.ends_with("#token=tok"));
        assert!(!url.contains("done?x=1"));
    }

    #[test]
    fn verification_email_includes_link() {
        let content = verification_email("https://accesso.dev/verify-email#token=abc");
        assert!(content.html.contains("token=abc"));
        assert!(content.text.contains("token=abc"));
        assert_eq!(content.subject, "Verify your email address");
    }

    #[test]
    fn log_sender_always_succeeds() {
        let sender = LogEmailSender;
        let content = reset_email("https://accesso.dev/reset-password#token=x");
        assert!(sender.send("alice@example.com", &content).is_ok());
    }
}
