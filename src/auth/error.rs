//! Error taxonomy for the authentication core.
//!
//! Enumeration-sensitive failures (`InvalidCredentials`, `InvalidCode`,
//! `ResetTokenInvalid`) deliberately cover several internal causes each; the
//! precise cause is only visible in diagnostics, never to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown identifier or wrong secret. The two are indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Wrong, expired, superseded, or absent one-time code.
    #[error("Invalid code")]
    InvalidCode,

    /// Attempt cap reached for this client identity and action class.
    #[error("Rate limited")]
    RateLimited,

    /// Remember-device token did not resolve to a live device record.
    #[error("Untrusted device")]
    UntrustedDevice,

    /// Reset token unknown, expired, or already used.
    #[error("Invalid or expired reset token")]
    ResetTokenInvalid,

    /// Signature, kind, shape, or lifetime failure at the token layer.
    #[error("Malformed token")]
    MalformedToken,

    /// Store or notifier I/O failure. The only retryable class: all core
    /// mutations are atomic, so retrying cannot half-apply anything.
    #[error("Temporary failure, retry later")]
    Transient(#[source] anyhow::Error),
}

impl AuthError {
    /// Whether a caller may safely retry the request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Transient(err)
    }
}
