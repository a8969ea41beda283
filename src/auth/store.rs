//! Credential-store records and the storage seam for the auth core.
//!
//! The core never talks to a database directly; everything goes through
//! [`AuthStore`]. Per-account mutations that the flows rely on (code
//! supersession and consumption, reset supersession and redemption) are
//! atomic inside each implementation: [`crate::auth::postgres::PgStore`] uses
//! single statements or transactions, [`MemoryStore`] holds one mutex across
//! the whole mutation.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Account role. Stored as lowercase text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Administrator,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Administrator => "administrator",
        }
    }

    /// Parse a stored role; unknown values fall back to the least privilege.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "administrator" => Self::Administrator,
            _ => Self::Member,
        }
    }
}

/// A credential record. Owned by the account store; this core reads it and
/// rotates `password_hash`, nothing else.
#[derive(Clone, Debug)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub password_hash: String,
}

impl Account {
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Fields required to create an account at registration time.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub password_hash: String,
}

/// Browser/OS/device class derived from the presenting client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub browser: String,
    pub os: String,
    pub device_class: String,
}

/// A device the account holder chose to remember.
#[derive(Clone, Debug, Serialize)]
pub struct TrustedDevice {
    pub id: Uuid,
    pub account_id: Uuid,
    pub browser: String,
    pub os: String,
    pub device_class: String,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// Storage contract consumed by the auth core.
///
/// Explicit `now` parameters on the time-sensitive operations keep expiry
/// decisions testable without sleeping; callers pass `Utc::now()`.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    /// Insert a new account; fails on a duplicate email.
    async fn insert_account(&self, new: NewAccount) -> Result<Account>;

    async fn update_password_hash(&self, account_id: Uuid, password_hash: &str) -> Result<()>;

    /// Persist a one-time code, superseding every prior code for the account
    /// in the same atomic unit.
    async fn replace_code(
        &self,
        account_id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically consume the latest unexpired code if it matches, deleting
    /// all codes for the account. Exactly one concurrent caller can observe
    /// `true`; everyone else gets `false`.
    async fn consume_code(
        &self,
        account_id: Uuid,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Persist a reset-token hash, marking every previously active token for
    /// the account as used in the same atomic unit.
    async fn replace_reset_token(
        &self,
        account_id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically mark the matching unused, unexpired reset token as used and
    /// rotate the account's password hash. Returns `false` when no such token
    /// exists; nothing is mutated in that case.
    async fn redeem_reset_token(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    async fn insert_device(
        &self,
        account_id: Uuid,
        descriptor: &DeviceDescriptor,
    ) -> Result<TrustedDevice>;

    /// Confirm a live device row and bump `last_used`. Returns `false` when
    /// the row is gone; validity is never cached.
    async fn touch_device(&self, account_id: Uuid, device_id: Uuid, now: DateTime<Utc>)
        -> Result<bool>;

    async fn list_devices(&self, account_id: Uuid) -> Result<Vec<TrustedDevice>>;

    async fn delete_device(&self, account_id: Uuid, device_id: Uuid) -> Result<bool>;

    async fn delete_all_devices(&self, account_id: Uuid) -> Result<u64>;
}

#[derive(Clone, Debug)]
struct StoredCode {
    code: String,
    expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
struct StoredReset {
    account_id: Uuid,
    token_hash: Vec<u8>,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    codes: HashMap<Uuid, StoredCode>,
    resets: Vec<StoredReset>,
    devices: Vec<TrustedDevice>,
}

/// In-memory store for tests and local development. One mutex guards the
/// whole state, so every trait operation is trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift a stored code's expiry into the past, simulating elapsed time.
    pub async fn expire_code(&self, account_id: Uuid) {
        let mut state = self.state.lock().await;
        if let Some(code) = state.codes.get_mut(&account_id) {
            code.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    /// Shift every stored reset token's expiry into the past.
    pub async fn expire_resets(&self, account_id: Uuid) {
        let mut state = self.state.lock().await;
        for reset in state
            .resets
            .iter_mut()
            .filter(|reset| reset.account_id == account_id)
        {
            reset.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state.accounts.get(&id).cloned())
    }

    async fn insert_account(&self, new: NewAccount) -> Result<Account> {
        let mut state = self.state.lock().await;
        if state.accounts.values().any(|account| account.email == new.email) {
            return Err(anyhow!("account already exists"));
        }
        let account = Account {
            id: Uuid::new_v4(),
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            role: new.role,
            password_hash: new.password_hash,
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn update_password_hash(&self, account_id: Uuid, password_hash: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow!("no such account"))?;
        account.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn replace_code(
        &self,
        account_id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.codes.insert(
            account_id,
            StoredCode {
                code: code.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn consume_code(
        &self,
        account_id: Uuid,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let matched = match state.codes.get(&account_id) {
            Some(stored) if stored.expires_at > now => {
                bool::from(stored.code.as_bytes().ct_eq(submitted.as_bytes()))
            }
            _ => false,
        };
        if matched {
            state.codes.remove(&account_id);
        }
        Ok(matched)
    }

    async fn replace_reset_token(
        &self,
        account_id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        for reset in state
            .resets
            .iter_mut()
            .filter(|reset| reset.account_id == account_id && reset.used_at.is_none())
        {
            reset.used_at = Some(now);
        }
        state.resets.push(StoredReset {
            account_id,
            token_hash: token_hash.to_vec(),
            expires_at,
            used_at: None,
        });
        Ok(())
    }

    async fn redeem_reset_token(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let account_id = match state.resets.iter_mut().find(|reset| {
            reset.used_at.is_none()
                && reset.expires_at > now
                && bool::from(reset.token_hash.as_slice().ct_eq(token_hash))
        }) {
            Some(reset) => {
                reset.used_at = Some(now);
                reset.account_id
            }
            None => return Ok(false),
        };
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow!("reset token references a missing account"))?;
        account.password_hash = new_password_hash.to_string();
        Ok(true)
    }

    async fn insert_device(
        &self,
        account_id: Uuid,
        descriptor: &DeviceDescriptor,
    ) -> Result<TrustedDevice> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let device = TrustedDevice {
            id: Uuid::new_v4(),
            account_id,
            browser: descriptor.browser.clone(),
            os: descriptor.os.clone(),
            device_class: descriptor.device_class.clone(),
            created_at: now,
            last_used: now,
        };
        state.devices.push(device.clone());
        Ok(device)
    }

    async fn touch_device(
        &self,
        account_id: Uuid,
        device_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .devices
            .iter_mut()
            .find(|device| device.account_id == account_id && device.id == device_id)
        {
            Some(device) => {
                device.last_used = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_devices(&self, account_id: Uuid) -> Result<Vec<TrustedDevice>> {
        let state = self.state.lock().await;
        let mut devices: Vec<TrustedDevice> = state
            .devices
            .iter()
            .filter(|device| device.account_id == account_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        Ok(devices)
    }

    async fn delete_device(&self, account_id: Uuid, device_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.devices.len();
        state
            .devices
            .retain(|device| !(device.account_id == account_id && device.id == device_id));
        Ok(state.devices.len() < before)
    }

    async fn delete_all_devices(&self, account_id: Uuid) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.devices.len();
        state.devices.retain(|device| device.account_id != account_id);
        Ok((before - state.devices.len()) as u64)
    }
}
