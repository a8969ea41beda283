use crate::{
    api,
    auth::{
        config::{AuthConfig, Environment, TokenKeys},
        flow::Authenticator,
        notifier::LogNotifier,
        postgres::PgStore,
    },
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;

pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub environment: Environment,
    pub frontend_url: String,
    pub pre_auth_key: SecretString,
    pub session_key: SecretString,
    pub remember_key: SecretString,
    pub session_ttl: i64,
    pub remember_ttl: i64,
    pub pre_auth_ttl: i64,
    pub reset_ttl: i64,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("frontend_url", &self.frontend_url)
            .field("session_ttl", &self.session_ttl)
            .field("remember_ttl", &self.remember_ttl)
            .finish_non_exhaustive()
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    info!(
        port = args.port,
        environment = ?args.environment,
        frontend_url = %args.frontend_url,
        "Starting server"
    );

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let config = AuthConfig::new(args.environment, args.frontend_url)
        .with_session_ttl_seconds(args.session_ttl)
        .with_remember_ttl_seconds(args.remember_ttl)
        .with_pre_auth_ttl_seconds(args.pre_auth_ttl)
        .with_reset_ttl_seconds(args.reset_ttl);
    let keys = TokenKeys::new(args.pre_auth_key, args.session_key, args.remember_key);

    let store = Arc::new(PgStore::new(pool.clone()));
    let authenticator = Arc::new(Authenticator::new(
        store,
        Arc::new(LogNotifier),
        keys,
        config,
    ));

    api::new(args.port, pool, authenticator).await
}
