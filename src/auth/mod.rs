//! Credential and session lifecycle.
//!
//! The modules here cover the full path from an anonymous request to an
//! authenticated session: password verification, the one-time-code
//! challenge, trusted devices, password resets, token issuance, and
//! process-local throttling. [`flow::Authenticator`] is the composition
//! callers use.

pub mod config;
pub mod device;
pub mod error;
pub mod flow;
pub mod notifier;
pub mod otp;
pub mod password;
pub mod postgres;
pub mod reset;
pub mod store;
pub mod throttle;
pub mod token;

pub use config::{AuthConfig, Environment, TokenKeys};
pub use error::AuthError;
pub use flow::{Authenticator, ClientInfo, LoginOutcome, VerifiedSession};
pub use store::{Account, AuthStore, MemoryStore, Role, TrustedDevice};
