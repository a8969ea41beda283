use crate::auth::config::Environment;
use crate::cli::actions::{Action, server::Args};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let environment = matches
        .get_one::<String>("environment")
        .map(|value| Environment::parse(value))
        .unwrap_or(Environment::Production);

    let frontend_url = matches
        .get_one::<String>("frontend-url")
        .cloned()
        .context("missing required argument: --frontend-url")?;

    let pre_auth_key = matches
        .get_one::<String>("pre-auth-key")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --pre-auth-key")?;
    let session_key = matches
        .get_one::<String>("session-key")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --session-key")?;
    let remember_key = matches
        .get_one::<String>("remember-key")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --remember-key")?;

    let session_ttl = matches
        .get_one::<i64>("session-ttl")
        .copied()
        .unwrap_or(3600);
    let remember_ttl = matches
        .get_one::<i64>("remember-ttl")
        .copied()
        .unwrap_or(2_592_000);
    let pre_auth_ttl = matches
        .get_one::<i64>("pre-auth-ttl")
        .copied()
        .unwrap_or(300);
    let reset_ttl = matches.get_one::<i64>("reset-ttl").copied().unwrap_or(3600);

    Ok(Action::Server(Args {
        port,
        dsn,
        environment,
        frontend_url,
        pre_auth_key,
        session_key,
        remember_key,
        session_ttl,
        remember_ttl,
        pre_auth_ttl,
        reset_ttl,
    }))
}
