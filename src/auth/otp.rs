//! One-time login codes: issue, supersede, consume.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, rngs::OsRng};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::config::Environment;
use super::store::AuthStore;

/// The well-known code accepted by the development profile so local flows
/// work without real delivery. Issuance checks the environment explicitly;
/// production configurations can never produce it deliberately.
pub const DEV_FIXED_CODE: &str = "123456";

const CODE_DIGITS: u32 = 1_000_000;

pub struct OtpManager {
    store: Arc<dyn AuthStore>,
    environment: Environment,
    ttl_seconds: i64,
}

impl OtpManager {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, environment: Environment, ttl_seconds: i64) -> Self {
        Self {
            store,
            environment,
            ttl_seconds,
        }
    }

    fn generate(&self) -> String {
        if self.environment == Environment::Development {
            return DEV_FIXED_CODE.to_string();
        }
        let value: u32 = OsRng.gen_range(0..CODE_DIGITS);
        format!("{value:06}")
    }

    /// Generate and persist a fresh code for the account, superseding every
    /// prior outstanding code. Returns the code for delivery; it is never
    /// logged here.
    pub async fn issue(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<String> {
        let code = self.generate();
        let expires_at = now + Duration::seconds(self.ttl_seconds);
        self.store.replace_code(account_id, &code, expires_at).await?;
        debug!(account_id = %account_id, "one-time code issued");
        Ok(code)
    }

    /// Consume the latest unexpired code for the account. `Ok(true)` for at
    /// most one concurrent caller; wrong, expired, superseded, and absent
    /// codes are all just `Ok(false)`.
    pub async fn consume(
        &self,
        account_id: Uuid,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.store.consume_code(account_id, submitted, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::{DEV_FIXED_CODE, OtpManager};
    use crate::auth::config::Environment;
    use crate::auth::store::{AuthStore, MemoryStore, NewAccount, Role};
    use anyhow::Result;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    async fn seeded() -> Result<(Arc<MemoryStore>, Uuid)> {
        let store = Arc::new(MemoryStore::new());
        let account = store
            .insert_account(NewAccount {
                email: "user@example.com".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                role: Role::Member,
                password_hash: "$argon2id$stub".to_string(),
            })
            .await?;
        Ok((store, account.id))
    }

    fn manager(store: Arc<MemoryStore>, environment: Environment) -> OtpManager {
        OtpManager::new(store, environment, 300)
    }

    #[tokio::test]
    async fn production_codes_are_six_digits() -> Result<()> {
        let (store, id) = seeded().await?;
        let otp = manager(store, Environment::Production);
        let code = otp.issue(id, Utc::now()).await?;
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        Ok(())
    }

    #[tokio::test]
    async fn development_profile_issues_fixed_code() -> Result<()> {
        let (store, id) = seeded().await?;
        let otp = manager(store, Environment::Development);
        assert_eq!(otp.issue(id, Utc::now()).await?, DEV_FIXED_CODE);
        Ok(())
    }

    #[tokio::test]
    async fn reissue_invalidates_prior_code() -> Result<()> {
        let (store, id) = seeded().await?;
        let otp = manager(store, Environment::Production);
        let first = otp.issue(id, Utc::now()).await?;
        let second = otp.issue(id, Utc::now()).await?;

        if first != second {
            assert!(!otp.consume(id, &first, Utc::now()).await?);
        }
        assert!(otp.consume(id, &second, Utc::now()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn consume_succeeds_exactly_once() -> Result<()> {
        let (store, id) = seeded().await?;
        let otp = manager(store, Environment::Production);
        let code = otp.issue(id, Utc::now()).await?;

        assert!(otp.consume(id, &code, Utc::now()).await?);
        assert!(!otp.consume(id, &code, Utc::now()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn code_expires_after_ttl() -> Result<()> {
        let (store, id) = seeded().await?;
        let otp = manager(store, Environment::Production);
        let issued_at = Utc::now();
        let code = otp.issue(id, issued_at).await?;

        let after_expiry = issued_at + Duration::minutes(5) + Duration::seconds(1);
        assert!(!otp.consume(id, &code, after_expiry).await?);
        Ok(())
    }
}
