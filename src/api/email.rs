//! Email delivery for verification codes and welcome messages.
//!
//! The `Mailer` trait is the seam between the registration flow and the
//! transport. `ResendMailer` delivers through the Resend HTTP API; with no
//! API key configured the server falls back to `LogMailer`, which logs the
//! code instead of sending it so local registration stays usable.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::info;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const FROM_ADDRESS: &str = "BSocial <onboarding@resend.dev>";

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a verification code, or return an error to surface upstream.
    async fn send_code(&self, email: &str, code: &str, ttl_minutes: i64) -> Result<()>;

    /// Deliver the post-registration welcome message.
    async fn send_welcome(&self, email: &str, name: &str) -> Result<()>;
}

/// Local dev mailer that logs instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_code(&self, email: &str, code: &str, ttl_minutes: i64) -> Result<()> {
        info!(
            to_email = %email,
            code = %code,
            ttl_minutes,
            "verification code (email delivery not configured)"
        );
        Ok(())
    }

    async fn send_welcome(&self, email: &str, name: &str) -> Result<()> {
        info!(to_email = %email, name = %name, "welcome email send stub");
        Ok(())
    }
}

/// Mailer backed by the Resend HTTP API.
pub struct ResendMailer {
    client: Client,
    api_key: SecretString,
    app_url: String,
}

impl ResendMailer {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: SecretString, app_url: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::api::APP_USER_AGENT)
            .build()
            .context("failed to build mail client")?;

        Ok(Self {
            client,
            api_key,
            app_url,
        })
    }

    async fn deliver(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let response = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "from": FROM_ADDRESS,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .context("failed to reach mail API")?;

        if response.status().is_success() {
            info!(to_email = %to, subject = %subject, "email sent");
            Ok(())
        } else {
            Err(anyhow!("mail API returned {}", response.status()))
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send_code(&self, email: &str, code: &str, ttl_minutes: i64) -> Result<()> {
        self.deliver(email, &code_subject(code), &code_html(code, ttl_minutes))
            .await
    }

    async fn send_welcome(&self, email: &str, name: &str) -> Result<()> {
        self.deliver(email, &welcome_subject(name), &welcome_html(name, &self.app_url))
            .await
    }
}

fn code_subject(code: &str) -> String {
    format!("{code} - Your BSocial Verification Code")
}

fn code_html(code: &str, ttl_minutes: i64) -> String {
    format!(
        "<h2>Verify Your Email</h2>\
         <p>Your verification code for BSocial is:</p>\
         <p style=\"font-size:32px;letter-spacing:8px\"><strong>{code}</strong></p>\
         <p>This code will expire in <strong>{ttl_minutes} minutes</strong>.</p>\
         <p>If you didn't request this code, please ignore this email.</p>"
    )
}

fn welcome_subject(name: &str) -> String {
    format!("Welcome to BSocial, {name}!")
}

fn welcome_html(name: &str, app_url: &str) -> String {
    format!(
        "<h2>Hey {name}!</h2>\
         <p>Welcome to the BSocial community.</p>\
         <p>Share posts, message fellow students, and follow club pages.</p>\
         <p><a href=\"{app_url}\">Start Exploring</a></p>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_never_fails() {
        let mailer = LogMailer;
        assert!(mailer
            .send_code("student@uktech.net.in", "123456", 10)
            .await
            .is_ok());
        assert!(mailer
            .send_welcome("student@uktech.net.in", "A B")
            .await
            .is_ok());
    }

    #[test]
    fn code_subject_contains_code() {
        assert_eq!(code_subject("123456"), "123456 - Your BSocial Verification Code");
    }

    #[test]
    fn code_html_mentions_ttl() {
        let html = code_html("654321", 10);
        assert!(html.contains("654321"));
        assert!(html.contains("10 minutes"));
    }

    #[test]
    fn welcome_html_links_app() {
        let html = welcome_html("A B", "https://bsocial.dev");
        assert!(html.contains("A B"));
        assert!(html.contains("https://bsocial.dev"));
    }

    #[test]
    fn resend_mailer_builds() {
        let mailer = ResendMailer::new(
            SecretString::from("re_test_key".to_string()),
            "https://bsocial.dev".to_string(),
        );
        assert!(mailer.is_ok());
    }
}
