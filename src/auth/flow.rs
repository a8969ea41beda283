//! Login orchestration.
//!
//! [`Authenticator`] drives the whole lifecycle: password check, one-time
//! code challenge, trusted-device bypass, session issuance, and password
//! resets. Handlers and the CLI only ever talk to this type; the managers it
//! composes stay internal to the auth core.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::{AuthConfig, TokenKeys};
use super::device::DeviceRegistry;
use super::error::AuthError;
use super::notifier::Notifier;
use super::otp::OtpManager;
use super::password;
use super::reset::ResetManager;
use super::store::{Account, AuthStore, NewAccount, Role, TrustedDevice};
use super::throttle::{ActionClass, ThrottleDecision, ThrottleGuard};
use super::token::{Claims, TokenKind, TokenSigner};

/// What the server knows about the caller. `address` keys the throttle
/// windows; `user_agent` feeds device classification.
#[derive(Clone, Debug)]
pub struct ClientInfo {
    pub address: String,
    pub user_agent: Option<String>,
}

/// Result of a password login. The tag tells the caller which credential it
/// received; a pre-auth token is never usable where a session is expected.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Trusted-device bypass succeeded; the caller is fully authenticated.
    Session { account: Account, token: String },
    /// Password accepted, one-time code delivered; the caller must verify.
    CodeRequired { pre_auth_token: String },
}

/// A remember-device credential minted at verification time.
#[derive(Debug)]
pub struct RememberIssue {
    pub device_id: Uuid,
    pub token: String,
}

/// Outcome of a successful code verification.
#[derive(Debug)]
pub struct VerifiedSession {
    pub account: Account,
    pub session_token: String,
    pub remember: Option<RememberIssue>,
}

pub struct Authenticator {
    store: Arc<dyn AuthStore>,
    notifier: Arc<dyn Notifier>,
    signer: TokenSigner,
    otp: OtpManager,
    devices: DeviceRegistry,
    reset: ResetManager,
    throttle: ThrottleGuard,
    config: AuthConfig,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        store: Arc<dyn AuthStore>,
        notifier: Arc<dyn Notifier>,
        keys: TokenKeys,
        config: AuthConfig,
    ) -> Self {
        let otp = OtpManager::new(
            Arc::clone(&store),
            config.environment(),
            config.code_ttl_seconds(),
        );
        let devices = DeviceRegistry::new(Arc::clone(&store));
        let reset = ResetManager::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            config.reset_ttl_seconds(),
            config.frontend_base_url().to_string(),
        );
        let throttle = ThrottleGuard::new(&config);
        let signer = TokenSigner::new(keys, &config);
        Self {
            store,
            notifier,
            signer,
            otp,
            devices,
            reset,
            throttle,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Password login. Unknown addresses and wrong passwords are
    /// indistinguishable, and the unknown-address path burns equivalent
    /// hashing work. A valid remember token for a still-live device skips the
    /// code challenge; a defective token or a revoked device falls back to
    /// the challenge instead of erroring. Failure to deliver the code is a
    /// transient error and the persisted code survives it.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_token: Option<&str>,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AuthError> {
        if self.throttle.check(&client.address, ActionClass::Login) == ThrottleDecision::Limited {
            return Err(AuthError::RateLimited);
        }

        let account = match self.store.find_account_by_email(email).await? {
            Some(account) => account,
            None => {
                password::equivalent_work()?;
                return Err(AuthError::InvalidCredentials);
            }
        };
        if !password::verify_password(password, &account.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();

        if let Some(token) = remember_token {
            match self.remembered_device(token, &account).await {
                Ok(device_id) => {
                    let session = self
                        .signer
                        .issue_session(account.id, account.role, now)
                        .map_err(|err| AuthError::Transient(err.into()))?;
                    info!(account_id = %account.id, device_id = %device_id, "trusted-device login");
                    return Ok(LoginOutcome::Session {
                        account,
                        token: session,
                    });
                }
                Err(error @ AuthError::Transient(_)) => return Err(error),
                Err(error) => {
                    debug!(account_id = %account.id, error = %error, "remember bypass declined");
                }
            }
        }

        let code = self.otp.issue(account.id, now).await?;
        if let Err(error) = self
            .notifier
            .send_code(&account.email, &account.display_name(), &code)
            .await
        {
            // The persisted code stays valid; a retried login reissues
            // and redelivers.
            warn!(account_id = %account.id, "code delivery failed");
            return Err(AuthError::Transient(error));
        }

        let pre_auth_token = self
            .signer
            .issue_pre_auth(account.id, now)
            .map_err(|err| AuthError::Transient(err.into()))?;
        info!(account_id = %account.id, "one-time code challenge started");
        Ok(LoginOutcome::CodeRequired { pre_auth_token })
    }

    /// Both halves of the trusted-device check: the token must verify as a
    /// remember token for this account, and the device row it names must
    /// still exist. A defective token is `MalformedToken`, a revoked device
    /// `UntrustedDevice`; the login path treats either as "run the code
    /// challenge instead".
    async fn remembered_device(
        &self,
        token: &str,
        account: &Account,
    ) -> Result<Uuid, AuthError> {
        let claims = self
            .signer
            .verify(token, TokenKind::Remember, Utc::now())
            .map_err(|error| {
                debug!(error = %error, "remember token rejected");
                AuthError::MalformedToken
            })?;
        if claims.sub != account.id {
            debug!(account_id = %account.id, "remember token subject mismatch");
            return Err(AuthError::MalformedToken);
        }
        let device_id = claims.device.ok_or(AuthError::MalformedToken)?;
        if self.devices.validate(account.id, device_id, Utc::now()).await? {
            Ok(device_id)
        } else {
            Err(AuthError::UntrustedDevice)
        }
    }

    /// Exchange a pre-auth token plus one-time code for a session. With
    /// `remember_device` the presenting client is registered and receives a
    /// remember token alongside.
    pub async fn verify_code(
        &self,
        pre_auth_token: &str,
        code: &str,
        remember_device: bool,
        client: &ClientInfo,
    ) -> Result<VerifiedSession, AuthError> {
        if self.throttle.check(&client.address, ActionClass::VerifyCode)
            == ThrottleDecision::Limited
        {
            return Err(AuthError::RateLimited);
        }

        let now = Utc::now();
        let claims = self
            .signer
            .verify(pre_auth_token, TokenKind::PreAuth, now)
            .map_err(|error| {
                debug!(error = %error, "pre-auth token rejected");
                AuthError::MalformedToken
            })?;

        if !self.otp.consume(claims.sub, code, now).await? {
            return Err(AuthError::InvalidCode);
        }

        let account = self
            .store
            .find_account_by_id(claims.sub)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let session_token = self
            .signer
            .issue_session(account.id, account.role, now)
            .map_err(|err| AuthError::Transient(err.into()))?;

        let remember = if remember_device {
            let device = self
                .devices
                .register(account.id, client.user_agent.as_deref())
                .await?;
            let token = self
                .signer
                .issue_remember(account.id, device.id, now)
                .map_err(|err| AuthError::Transient(err.into()))?;
            Some(RememberIssue {
                device_id: device.id,
                token,
            })
        } else {
            None
        };

        info!(account_id = %account.id, remembered = remember.is_some(), "session issued");
        Ok(VerifiedSession {
            account,
            session_token,
            remember,
        })
    }

    /// Verify a bearer session token and return its claims.
    pub fn authenticate_session(&self, token: &str) -> Result<Claims, AuthError> {
        self.signer
            .verify(token, TokenKind::Session, Utc::now())
            .map_err(|error| {
                debug!(error = %error, "session token rejected");
                AuthError::MalformedToken
            })
    }

    /// Create an account. Returns `None` when the email is already taken.
    pub async fn register(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        role: Role,
        plaintext: &str,
    ) -> Result<Option<Account>, AuthError> {
        if self.store.find_account_by_email(email).await?.is_some() {
            return Ok(None);
        }
        let password_hash = password::hash_password(plaintext)?;
        let account = self
            .store
            .insert_account(NewAccount {
                email: email.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                role,
                password_hash,
            })
            .await?;
        info!(account_id = %account.id, "account registered");
        Ok(Some(account))
    }

    /// Start a password reset. Always acknowledges; see
    /// [`ResetManager::request`].
    pub async fn request_reset(&self, email: &str) -> Result<(), AuthError> {
        self.reset.request(email, Utc::now()).await?;
        Ok(())
    }

    /// Redeem a reset token and install the new password.
    pub async fn redeem_reset(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        if self.reset.redeem(token, new_password, Utc::now()).await? {
            Ok(())
        } else {
            Err(AuthError::ResetTokenInvalid)
        }
    }

    pub async fn list_devices(&self, account_id: Uuid) -> Result<Vec<TrustedDevice>, AuthError> {
        Ok(self.devices.list(account_id).await?)
    }

    pub async fn revoke_device(
        &self,
        account_id: Uuid,
        device_id: Uuid,
    ) -> Result<bool, AuthError> {
        Ok(self.devices.revoke(account_id, device_id).await?)
    }

    pub async fn revoke_all_devices(&self, account_id: Uuid) -> Result<u64, AuthError> {
        Ok(self.devices.revoke_all(account_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::{Authenticator, ClientInfo, LoginOutcome};
    use crate::auth::config::{AuthConfig, Environment, TokenKeys};
    use crate::auth::error::AuthError;
    use crate::auth::notifier::{Notifier, testing::RecordingNotifier};
    use crate::auth::store::{AuthStore, MemoryStore, Role};
    use anyhow::{Context, Result};
    use chrono::Utc;
    use secrecy::SecretString;
    use std::sync::Arc;

    const UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

    fn client() -> ClientInfo {
        ClientInfo {
            address: "203.0.113.7".to_string(),
            user_agent: Some(UA.to_string()),
        }
    }

    fn keys() -> TokenKeys {
        TokenKeys::new(
            SecretString::from("pre-auth-test-key".to_string()),
            SecretString::from("session-test-key".to_string()),
            SecretString::from("remember-test-key".to_string()),
        )
    }

    async fn harness() -> Result<(Authenticator, Arc<RecordingNotifier>)> {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let config = AuthConfig::new(
            Environment::Production,
            "https://portal.example.com".to_string(),
        );
        let auth = Authenticator::new(
            store,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            keys(),
            config,
        );
        auth.register("user@example.com", "Ada", "Lovelace", Role::Member, "correct-horse")
            .await?;
        Ok((auth, notifier))
    }

    fn pre_auth(outcome: LoginOutcome) -> String {
        match outcome {
            LoginOutcome::CodeRequired { pre_auth_token } => pre_auth_token,
            LoginOutcome::Session { .. } => panic!("expected a code challenge"),
        }
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_identical() -> Result<()> {
        let (auth, _) = harness().await?;
        let wrong = auth
            .login("user@example.com", "wrong-pass", None, &client())
            .await;
        let unknown = auth
            .login("nobody@example.com", "whatever", None, &client())
            .await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
        Ok(())
    }

    #[tokio::test]
    async fn login_then_verify_issues_session() -> Result<()> {
        let (auth, notifier) = harness().await?;
        let outcome = auth
            .login("user@example.com", "correct-horse", None, &client())
            .await?;
        let token = pre_auth(outcome);
        let code = notifier.last_code().expect("code delivered");

        let session = auth.verify_code(&token, &code, false, &client()).await?;
        assert!(session.remember.is_none());

        let claims = auth.authenticate_session(&session.session_token)?;
        assert_eq!(claims.sub, session.account.id);
        assert_eq!(claims.role, Some(Role::Member));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_rejected_and_right_code_single_use() -> Result<()> {
        let (auth, notifier) = harness().await?;
        let token = pre_auth(
            auth.login("user@example.com", "correct-horse", None, &client())
                .await?,
        );
        let code = notifier.last_code().expect("code delivered");
        let wrong = if code == "654321" { "123456" } else { "654321" };

        let denied = auth.verify_code(&token, wrong, false, &client()).await;
        assert!(matches!(denied, Err(AuthError::InvalidCode)));

        assert!(auth.verify_code(&token, &code, false, &client()).await.is_ok());
        let replay = auth.verify_code(&token, &code, false, &client()).await;
        assert!(matches!(replay, Err(AuthError::InvalidCode)));
        Ok(())
    }

    #[tokio::test]
    async fn fresh_login_supersedes_outstanding_code() -> Result<()> {
        let (auth, notifier) = harness().await?;
        auth.login("user@example.com", "correct-horse", None, &client())
            .await?;
        let stale = notifier.last_code().expect("first code");

        let token = pre_auth(
            auth.login("user@example.com", "correct-horse", None, &client())
                .await?,
        );
        let fresh = notifier.last_code().expect("second code");

        if stale != fresh {
            let denied = auth.verify_code(&token, &stale, false, &client()).await;
            assert!(matches!(denied, Err(AuthError::InvalidCode)));
        }
        assert!(auth.verify_code(&token, &fresh, false, &client()).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn garbage_pre_auth_token_is_malformed() -> Result<()> {
        let (auth, _) = harness().await?;
        let denied = auth
            .verify_code("not-a-token", "123456", false, &client())
            .await;
        assert!(matches!(denied, Err(AuthError::MalformedToken)));
        Ok(())
    }

    #[tokio::test]
    async fn session_token_rejected_as_pre_auth() -> Result<()> {
        let (auth, notifier) = harness().await?;
        let token = pre_auth(
            auth.login("user@example.com", "correct-horse", None, &client())
                .await?,
        );
        let code = notifier.last_code().expect("code");
        let session = auth.verify_code(&token, &code, false, &client()).await?;

        let replay = auth
            .verify_code(&session.session_token, "123456", false, &client())
            .await;
        assert!(matches!(replay, Err(AuthError::MalformedToken)));
        Ok(())
    }

    #[tokio::test]
    async fn remember_device_bypasses_code_until_revoked() -> Result<()> {
        let (auth, notifier) = harness().await?;
        let token = pre_auth(
            auth.login("user@example.com", "correct-horse", None, &client())
                .await?,
        );
        let code = notifier.last_code().expect("code");
        let session = auth.verify_code(&token, &code, true, &client()).await?;
        let remember = session.remember.expect("remember issued");

        // Bypass works while the device row is live.
        let outcome = auth
            .login(
                "user@example.com",
                "correct-horse",
                Some(&remember.token),
                &client(),
            )
            .await?;
        assert!(matches!(outcome, LoginOutcome::Session { .. }));

        // Revocation kills the bypass even though the token is still valid.
        let account_id = session.account.id;
        assert!(auth.revoke_device(account_id, remember.device_id).await?);
        let outcome = auth
            .login(
                "user@example.com",
                "correct-horse",
                Some(&remember.token),
                &client(),
            )
            .await?;
        assert!(matches!(outcome, LoginOutcome::CodeRequired { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn code_delivery_failure_is_transient_and_keeps_the_code() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::failing());
        let config = AuthConfig::new(
            Environment::Development,
            "https://portal.example.com".to_string(),
        );
        let auth = Authenticator::new(
            Arc::clone(&store) as Arc<dyn AuthStore>,
            notifier,
            keys(),
            config,
        );
        let account = auth
            .register("user@example.com", "Ada", "Lovelace", Role::Member, "correct-horse")
            .await?
            .context("fresh account")?;

        let denied = auth
            .login("user@example.com", "correct-horse", None, &client())
            .await;
        assert!(matches!(denied, Err(AuthError::Transient(_))));

        // The development profile issues the fixed code; it survives the
        // failed delivery and still redeems.
        assert!(store.consume_code(account.id, "123456", Utc::now()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn tampered_remember_token_falls_back_to_challenge() -> Result<()> {
        let (auth, _) = harness().await?;
        let outcome = auth
            .login(
                "user@example.com",
                "correct-horse",
                Some("bogus.remember-token"),
                &client(),
            )
            .await?;
        assert!(matches!(outcome, LoginOutcome::CodeRequired { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn remember_token_still_requires_password() -> Result<()> {
        let (auth, notifier) = harness().await?;
        let token = pre_auth(
            auth.login("user@example.com", "correct-horse", None, &client())
                .await?,
        );
        let code = notifier.last_code().expect("code");
        let session = auth.verify_code(&token, &code, true, &client()).await?;
        let remember = session.remember.expect("remember issued");

        let denied = auth
            .login(
                "user@example.com",
                "wrong-pass",
                Some(&remember.token),
                &client(),
            )
            .await;
        assert!(matches!(denied, Err(AuthError::InvalidCredentials)));
        Ok(())
    }

    #[tokio::test]
    async fn code_attempts_rate_limited_after_five() -> Result<()> {
        let (auth, notifier) = harness().await?;
        let token = pre_auth(
            auth.login("user@example.com", "correct-horse", None, &client())
                .await?,
        );
        let code = notifier.last_code().expect("code");
        let wrong = if code == "000000" { "999999" } else { "000000" };

        for _ in 0..5 {
            let denied = auth.verify_code(&token, wrong, false, &client()).await;
            assert!(matches!(denied, Err(AuthError::InvalidCode)));
        }
        let limited = auth.verify_code(&token, &code, false, &client()).await;
        assert!(matches!(limited, Err(AuthError::RateLimited)));
        Ok(())
    }

    #[tokio::test]
    async fn login_attempts_rate_limited_after_ten() -> Result<()> {
        let (auth, _) = harness().await?;
        for _ in 0..10 {
            let denied = auth
                .login("user@example.com", "wrong-pass", None, &client())
                .await;
            assert!(matches!(denied, Err(AuthError::InvalidCredentials)));
        }
        let limited = auth
            .login("user@example.com", "correct-horse", None, &client())
            .await;
        assert!(matches!(limited, Err(AuthError::RateLimited)));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_registration_returns_none() -> Result<()> {
        let (auth, _) = harness().await?;
        let duplicate = auth
            .register("user@example.com", "Eve", "Mallory", Role::Member, "whatever-pass")
            .await?;
        assert!(duplicate.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn reset_flow_rotates_password() -> Result<()> {
        let (auth, notifier) = harness().await?;
        auth.request_reset("user@example.com").await?;
        let link = notifier.last_link().expect("link");
        let token = link.split("token=").nth(1).expect("token param");

        auth.redeem_reset(token, "brand-new-pass").await?;

        let denied = auth
            .login("user@example.com", "correct-horse", None, &client())
            .await;
        assert!(matches!(denied, Err(AuthError::InvalidCredentials)));
        assert!(auth
            .login("user@example.com", "brand-new-pass", None, &client())
            .await
            .is_ok());

        let reuse = auth.redeem_reset(token, "another-pass").await;
        assert!(matches!(reuse, Err(AuthError::ResetTokenInvalid)));
        Ok(())
    }
}
