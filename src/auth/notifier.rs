//! Out-of-band delivery seam for one-time codes and reset links.
//!
//! Delivery is fire-and-confirm: a failure is reported to the caller but
//! never rolls back persisted code/token state, so a retry can re-trigger
//! delivery without reissuing.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a one-time login code to an address.
    async fn send_code(&self, address: &str, display_name: &str, code: &str) -> Result<()>;

    /// Deliver a password-reset link to an address.
    async fn send_reset_link(&self, address: &str, display_name: &str, link: &str) -> Result<()>;
}

/// Local development sender that logs delivery intent instead of sending.
/// Codes and links only appear at debug level, never in production logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_code(&self, address: &str, display_name: &str, code: &str) -> Result<()> {
        info!(to = %address, name = %display_name, "one-time code delivery stub");
        debug!(code = %code, "one-time code (development only)");
        Ok(())
    }

    async fn send_reset_link(&self, address: &str, display_name: &str, link: &str) -> Result<()> {
        info!(to = %address, name = %display_name, "reset link delivery stub");
        debug!(link = %link, "reset link (development only)");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Notifier;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records deliveries so tests can read the code/link back; optionally
    /// fails every send to exercise the degraded-delivery paths.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub codes: Mutex<Vec<(String, String)>>,
        pub links: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn last_code(&self) -> Option<String> {
            self.codes
                .lock()
                .expect("lock")
                .last()
                .map(|(_, code)| code.clone())
        }

        pub fn last_link(&self) -> Option<String> {
            self.links
                .lock()
                .expect("lock")
                .last()
                .map(|(_, link)| link.clone())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_code(&self, address: &str, _display_name: &str, code: &str) -> Result<()> {
            if self.fail {
                return Err(anyhow!("delivery refused"));
            }
            self.codes
                .lock()
                .expect("lock")
                .push((address.to_string(), code.to_string()));
            Ok(())
        }

        async fn send_reset_link(
            &self,
            address: &str,
            _display_name: &str,
            link: &str,
        ) -> Result<()> {
            if self.fail {
                return Err(anyhow!("delivery refused"));
            }
            self.links
                .lock()
                .expect("lock")
                .push((address.to_string(), link.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LogNotifier, Notifier};
    use anyhow::Result;

    #[tokio::test]
    async fn log_notifier_always_confirms() -> Result<()> {
        let notifier = LogNotifier;
        notifier.send_code("user@example.com", "Ada Lovelace", "123456").await?;
        notifier
            .send_reset_link("user@example.com", "Ada Lovelace", "https://presenza.dev/reset")
            .await?;
        Ok(())
    }
}
