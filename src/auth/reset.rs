//! Password-reset tokens.
//!
//! Requests are indistinguishable from the outside whether or not the email
//! maps to an account; only the stored state and the outgoing message differ.
//! Tokens are random, single-use, and stored hashed, so the table never holds
//! anything redeemable.

use anyhow::Result;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use super::notifier::Notifier;
use super::password;
use super::store::AuthStore;

const TOKEN_BYTES: usize = 32;

pub struct ResetManager {
    store: Arc<dyn AuthStore>,
    notifier: Arc<dyn Notifier>,
    ttl_seconds: i64,
    frontend_base_url: String,
}

impl ResetManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn AuthStore>,
        notifier: Arc<dyn Notifier>,
        ttl_seconds: i64,
        frontend_base_url: String,
    ) -> Self {
        Self {
            store,
            notifier,
            ttl_seconds,
            frontend_base_url,
        }
    }

    fn reset_link(&self, token: &str) -> String {
        format!(
            "{}/reset-password?token={token}",
            self.frontend_base_url.trim_end_matches('/')
        )
    }

    /// Start a reset for the address. Completes in `Ok(())` whether or not an
    /// account exists; unknown addresses burn equivalent hashing work so the
    /// two paths cost the same.
    pub async fn request(&self, email: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(account) = self.store.find_account_by_email(email).await? else {
            password::equivalent_work()?;
            info!("password reset requested for unknown address");
            return Ok(());
        };

        let mut raw = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut raw);
        let token = URL_SAFE_NO_PAD.encode(raw);
        let token_hash = Sha256::digest(token.as_bytes());

        let expires_at = now + Duration::seconds(self.ttl_seconds);
        self.store
            .replace_reset_token(account.id, &token_hash, expires_at, now)
            .await?;
        info!(account_id = %account.id, "password reset token issued");

        let link = self.reset_link(&token);
        if let Err(error) = self
            .notifier
            .send_reset_link(&account.email, &account.display_name(), &link)
            .await
        {
            // The token is persisted and expiring; the caller still sees the
            // opaque acknowledgement.
            warn!(account_id = %account.id, error = %error, "reset link delivery failed");
        }
        Ok(())
    }

    /// Redeem a token and install the new password hash. `Ok(false)` covers
    /// unknown, expired, superseded, and already-used tokens alike; the
    /// matching row is marked used in the same atomic unit as the rotation.
    pub async fn redeem(&self, token: &str, new_password: &str, now: DateTime<Utc>) -> Result<bool> {
        let token_hash = Sha256::digest(token.as_bytes());
        let new_hash = password::hash_password(new_password)?;
        let redeemed = self
            .store
            .redeem_reset_token(&token_hash, &new_hash, now)
            .await?;
        if redeemed {
            info!("password reset redeemed");
        }
        Ok(redeemed)
    }
}

#[cfg(test)]
mod tests {
    use super::ResetManager;
    use crate::auth::notifier::{Notifier, testing::RecordingNotifier};
    use crate::auth::password;
    use crate::auth::store::{AuthStore, MemoryStore, NewAccount, Role};
    use anyhow::Result;
    use chrono::Utc;
    use std::sync::Arc;

    async fn setup() -> Result<(Arc<MemoryStore>, Arc<RecordingNotifier>, ResetManager)> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_account(NewAccount {
                email: "user@example.com".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                role: Role::Member,
                password_hash: password::hash_password("original-pass")?,
            })
            .await?;
        let notifier = Arc::new(RecordingNotifier::new());
        let manager = ResetManager::new(
            Arc::clone(&store) as Arc<dyn AuthStore>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            3600,
            "https://portal.example.com".to_string(),
        );
        Ok((store, notifier, manager))
    }

    fn token_from_link(link: &str) -> String {
        link.split("token=").nth(1).expect("token param").to_string()
    }

    #[tokio::test]
    async fn unknown_address_acknowledged_without_delivery() -> Result<()> {
        let (_store, notifier, manager) = setup().await?;
        manager.request("nobody@example.com", Utc::now()).await?;
        assert!(notifier.last_link().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn full_reset_round_trip() -> Result<()> {
        let (store, notifier, manager) = setup().await?;
        manager.request("user@example.com", Utc::now()).await?;

        let link = notifier.last_link().expect("reset link delivered");
        assert!(link.starts_with("https://portal.example.com/reset-password?token="));
        let token = token_from_link(&link);

        assert!(manager.redeem(&token, "fresh-password", Utc::now()).await?);
        let account = store
            .find_account_by_email("user@example.com")
            .await?
            .expect("account");
        assert!(password::verify_password("fresh-password", &account.password_hash));
        Ok(())
    }

    #[tokio::test]
    async fn token_is_single_use() -> Result<()> {
        let (_store, notifier, manager) = setup().await?;
        manager.request("user@example.com", Utc::now()).await?;
        let token = token_from_link(&notifier.last_link().expect("link"));

        assert!(manager.redeem(&token, "first-new-pass", Utc::now()).await?);
        assert!(!manager.redeem(&token, "second-new-pass", Utc::now()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn new_request_supersedes_prior_token() -> Result<()> {
        let (_store, notifier, manager) = setup().await?;
        manager.request("user@example.com", Utc::now()).await?;
        let first = token_from_link(&notifier.last_link().expect("link"));
        manager.request("user@example.com", Utc::now()).await?;
        let second = token_from_link(&notifier.last_link().expect("link"));

        assert!(!manager.redeem(&first, "new-pass", Utc::now()).await?);
        assert!(manager.redeem(&second, "new-pass", Utc::now()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_rejected() -> Result<()> {
        let (store, notifier, manager) = setup().await?;
        manager.request("user@example.com", Utc::now()).await?;
        let token = token_from_link(&notifier.last_link().expect("link"));

        let account = store
            .find_account_by_email("user@example.com")
            .await?
            .expect("account");
        store.expire_resets(account.id).await;
        assert!(!manager.redeem(&token, "new-pass", Utc::now()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn delivery_failure_still_acknowledges() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_account(NewAccount {
                email: "user@example.com".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                role: Role::Member,
                password_hash: password::hash_password("original-pass")?,
            })
            .await?;
        let manager = ResetManager::new(
            store,
            Arc::new(RecordingNotifier::failing()),
            3600,
            "https://portal.example.com".to_string(),
        );
        assert!(manager.request("user@example.com", Utc::now()).await.is_ok());
        Ok(())
    }
}
