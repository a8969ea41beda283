//! Trusted-device registry.
//!
//! A remembered device is only honoured while two independent checks pass:
//! the remember token's signature verifies, and the device row it names is
//! still live. Revoking the row is therefore an immediate kill switch no
//! matter how long the token has left.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::store::{AuthStore, DeviceDescriptor, TrustedDevice};

pub struct DeviceRegistry {
    store: Arc<dyn AuthStore>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Record the presenting client as trusted for the account.
    pub async fn register(
        &self,
        account_id: Uuid,
        user_agent: Option<&str>,
    ) -> Result<TrustedDevice> {
        let descriptor = describe_user_agent(user_agent);
        let device = self.store.insert_device(account_id, &descriptor).await?;
        info!(account_id = %account_id, device_id = %device.id, "trusted device registered");
        Ok(device)
    }

    /// Check that the device row is still live and bump its `last_used`.
    /// Storage is consulted on every call.
    pub async fn validate(
        &self,
        account_id: Uuid,
        device_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.store.touch_device(account_id, device_id, now).await
    }

    /// Devices for the account, most recently used first.
    pub async fn list(&self, account_id: Uuid) -> Result<Vec<TrustedDevice>> {
        self.store.list_devices(account_id).await
    }

    /// Remove one device. Returns `false` when the id does not belong to the
    /// account or no longer exists.
    pub async fn revoke(&self, account_id: Uuid, device_id: Uuid) -> Result<bool> {
        let removed = self.store.delete_device(account_id, device_id).await?;
        if removed {
            info!(account_id = %account_id, device_id = %device_id, "trusted device revoked");
        }
        Ok(removed)
    }

    /// Remove every device for the account. Returns how many were removed.
    pub async fn revoke_all(&self, account_id: Uuid) -> Result<u64> {
        let removed = self.store.delete_all_devices(account_id).await?;
        info!(account_id = %account_id, removed, "all trusted devices revoked");
        Ok(removed)
    }
}

/// Best-effort classification of a `User-Agent` header. Unrecognised or
/// missing values come back as `"Unknown"` rather than failing the flow.
#[must_use]
pub fn describe_user_agent(user_agent: Option<&str>) -> DeviceDescriptor {
    let ua = user_agent.unwrap_or_default();

    let browser = if ua.contains("Edg/") {
        "Edge"
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        "Opera"
    } else if ua.contains("Firefox/") {
        "Firefox"
    } else if ua.contains("Chrome/") {
        "Chrome"
    } else if ua.contains("Safari/") {
        "Safari"
    } else {
        "Unknown"
    };

    let os = if ua.contains("Windows NT") {
        "Windows"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Mac OS X") {
        "macOS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "Unknown"
    };

    let device_class = if ua.contains("iPad") || ua.contains("Tablet") {
        "tablet"
    } else if ua.contains("Mobile") || ua.contains("iPhone") || ua.contains("Android") {
        "mobile"
    } else {
        "desktop"
    };

    DeviceDescriptor {
        browser: browser.to_string(),
        os: os.to_string(),
        device_class: device_class.to_string(),
    }
}
