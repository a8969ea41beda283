//! # Presenza
//!
//! `presenza` is the authentication and session core of an employee portal.
//! A password alone never yields a session: it buys a short-lived pre-auth
//! token and a six-digit one-time code, and only the code exchange mints the
//! session. Clients the account holder chooses to remember get a long-lived
//! remember-device token that skips the code step, but only while both the
//! token signature verifies and the device row is still in the registry, so
//! revoking the row is an immediate kill switch.
//!
//! ## Layout
//!
//! - [`auth`] holds the lifecycle itself: credential checks, one-time codes,
//!   trusted devices, password resets, token issuance, and throttling.
//! - [`api`] is the axum HTTP surface over it.
//! - [`cli`] parses arguments, initializes logging, and starts the server.
//!
//! ## Tokens
//!
//! Three token kinds exist, each signed with its own key: pre-auth (5
//! minutes), session (1 hour), and remember-device (30 days). A token of one
//! kind never verifies as another.

pub mod api;
pub mod auth;
pub mod cli;

pub use api::GIT_COMMIT_HASH;
