//! Auth configuration: environment profile, token lifetimes, throttle caps.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

const DEFAULT_PRE_AUTH_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_REMEMBER_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_CODE_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_RESET_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_LOGIN_ATTEMPTS: u32 = 10;
const DEFAULT_LOGIN_WINDOW_SECONDS: u64 = 60 * 60;
const DEFAULT_CODE_ATTEMPTS: u32 = 5;
const DEFAULT_CODE_WINDOW_SECONDS: u64 = 15 * 60;

/// Deployment profile. Only `Development` unlocks the fixed one-time code;
/// `Production` is the default and every non-development behavior gate checks
/// this explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    /// Parse a profile name; anything unrecognized is treated as production.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            _ => Self::Production,
        }
    }

    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    environment: Environment,
    frontend_base_url: String,
    pre_auth_ttl_seconds: i64,
    session_ttl_seconds: i64,
    remember_ttl_seconds: i64,
    code_ttl_seconds: i64,
    reset_ttl_seconds: i64,
    login_attempts: u32,
    login_window: Duration,
    code_attempts: u32,
    code_window: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(environment: Environment, frontend_base_url: String) -> Self {
        Self {
            environment,
            frontend_base_url,
            pre_auth_ttl_seconds: DEFAULT_PRE_AUTH_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            remember_ttl_seconds: DEFAULT_REMEMBER_TTL_SECONDS,
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            reset_ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
            login_attempts: DEFAULT_LOGIN_ATTEMPTS,
            login_window: Duration::from_secs(DEFAULT_LOGIN_WINDOW_SECONDS),
            code_attempts: DEFAULT_CODE_ATTEMPTS,
            code_window: Duration::from_secs(DEFAULT_CODE_WINDOW_SECONDS),
        }
    }

    #[must_use]
    pub fn with_pre_auth_ttl_seconds(mut self, seconds: i64) -> Self {
        self.pre_auth_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_remember_ttl_seconds(mut self, seconds: i64) -> Self {
        self.remember_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_login_throttle(mut self, attempts: u32, window: Duration) -> Self {
        self.login_attempts = attempts;
        self.login_window = window;
        self
    }

    #[must_use]
    pub fn with_code_throttle(mut self, attempts: u32, window: Duration) -> Self {
        self.code_attempts = attempts;
        self.code_window = window;
        self
    }

    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn pre_auth_ttl_seconds(&self) -> i64 {
        self.pre_auth_ttl_seconds
    }

    #[must_use]
    pub const fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub const fn remember_ttl_seconds(&self) -> i64 {
        self.remember_ttl_seconds
    }

    #[must_use]
    pub const fn code_ttl_seconds(&self) -> i64 {
        self.code_ttl_seconds
    }

    #[must_use]
    pub const fn reset_ttl_seconds(&self) -> i64 {
        self.reset_ttl_seconds
    }

    #[must_use]
    pub const fn login_attempts(&self) -> u32 {
        self.login_attempts
    }

    #[must_use]
    pub const fn login_window(&self) -> Duration {
        self.login_window
    }

    #[must_use]
    pub const fn code_attempts(&self) -> u32 {
        self.code_attempts
    }

    #[must_use]
    pub const fn code_window(&self) -> Duration {
        self.code_window
    }

    /// Remember-device cookies are only marked `Secure` when the frontend is
    /// served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// One signing key per token kind, so a token minted for one purpose can
/// never verify as another even if its payload shape is compatible.
#[derive(Clone)]
pub struct TokenKeys {
    pre_auth: SecretString,
    session: SecretString,
    remember: SecretString,
}

impl TokenKeys {
    #[must_use]
    pub const fn new(pre_auth: SecretString, session: SecretString, remember: SecretString) -> Self {
        Self {
            pre_auth,
            session,
            remember,
        }
    }

    pub(crate) fn pre_auth(&self) -> &[u8] {
        self.pre_auth.expose_secret().as_bytes()
    }

    pub(crate) fn session(&self) -> &[u8] {
        self.session.expose_secret().as_bytes()
    }

    pub(crate) fn remember(&self) -> &[u8] {
        self.remember.expose_secret().as_bytes()
    }
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("pre_auth", &"***")
            .field("session", &"***")
            .field("remember", &"***")
            .finish()
    }
}
