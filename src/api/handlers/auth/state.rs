//! Auth configuration and shared per-process state.

use std::sync::Arc;

use crate::api::email::Mailer;

use super::password::PasswordHasher;
use super::tokens::TokenService;

const DEFAULT_OTP_TTL_MINUTES: i64 = 10;
const DEFAULT_ACCESS_TTL_MINUTES: i64 = 15;
const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    app_url: String,
    otp_ttl_minutes: i64,
    access_ttl_minutes: i64,
    refresh_ttl_days: i64,
    allowed_email_domain: Option<String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(app_url: String) -> Self {
        Self {
            app_url,
            otp_ttl_minutes: DEFAULT_OTP_TTL_MINUTES,
            access_ttl_minutes: DEFAULT_ACCESS_TTL_MINUTES,
            refresh_ttl_days: DEFAULT_REFRESH_TTL_DAYS,
            allowed_email_domain: None,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_minutes(mut self, minutes: i64) -> Self {
        self.otp_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_access_ttl_minutes(mut self, minutes: i64) -> Self {
        self.access_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_days(mut self, days: i64) -> Self {
        self.refresh_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_allowed_email_domain(mut self, domain: String) -> Self {
        self.allowed_email_domain = Some(domain);
        self
    }

    #[must_use]
    pub fn app_url(&self) -> &str {
        &self.app_url
    }

    #[must_use]
    pub const fn otp_ttl_minutes(&self) -> i64 {
        self.otp_ttl_minutes
    }

    #[must_use]
    pub const fn access_ttl_minutes(&self) -> i64 {
        self.access_ttl_minutes
    }

    #[must_use]
    pub const fn refresh_ttl_days(&self) -> i64 {
        self.refresh_ttl_days
    }

    /// Registration domain policy: open unless a domain suffix is configured.
    #[must_use]
    pub fn email_allowed(&self, email: &str) -> bool {
        self.allowed_email_domain.as_ref().map_or(true, |domain| {
            email
                .rsplit_once('@')
                .is_some_and(|(_, candidate)| candidate.eq_ignore_ascii_case(domain))
        })
    }

    /// Refresh cookies are marked `Secure` only when the app is served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.app_url.starts_with("https://")
    }
}

/// Dependency-injected services shared by the auth handlers.
///
/// Constructed once at startup and attached to the router as an `Extension`.
pub struct AuthState {
    config: AuthConfig,
    tokens: TokenService,
    hasher: Arc<dyn PasswordHasher>,
    mailer: Arc<dyn Mailer>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        tokens: TokenService,
        hasher: Arc<dyn PasswordHasher>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            tokens,
            hasher,
            mailer,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn hasher(&self) -> Arc<dyn PasswordHasher> {
        Arc::clone(&self.hasher)
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }
}
