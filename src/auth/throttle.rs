//! Brute-force throttling per client identity and action class.
//!
//! Counters live in process memory over fixed windows that reset strictly on
//! wall-clock elapse, not on a sliding basis. Losing them on restart is
//! acceptable; the guard only has to be uncontended-cheap, not durable.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::config::AuthConfig;

/// Action classes with independent windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionClass {
    Login,
    VerifyCode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed,
    Limited,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    attempts: u32,
}

#[derive(Debug)]
pub struct ThrottleGuard {
    login_attempts: u32,
    login_window: Duration,
    code_attempts: u32,
    code_window: Duration,
    windows: Mutex<HashMap<(String, ActionClass), Window>>,
}

impl ThrottleGuard {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            login_attempts: config.login_attempts(),
            login_window: config.login_window(),
            code_attempts: config.code_attempts(),
            code_window: config.code_window(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    const fn limit_for(&self, class: ActionClass) -> (u32, Duration) {
        match class {
            ActionClass::Login => (self.login_attempts, self.login_window),
            ActionClass::VerifyCode => (self.code_attempts, self.code_window),
        }
    }

    /// Register an attempt and decide whether it may proceed. Must be called
    /// before any downstream state is touched.
    pub fn check(&self, client: &str, class: ActionClass) -> ThrottleDecision {
        self.check_at(client, class, Instant::now())
    }

    fn check_at(&self, client: &str, class: ActionClass, now: Instant) -> ThrottleDecision {
        let (max_attempts, window) = self.limit_for(class);
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Drop windows that fully elapsed so the map stays bounded.
        windows.retain(|(_, entry_class), entry| {
            let (_, entry_window) = self.limit_for(*entry_class);
            now.duration_since(entry.started) < entry_window
        });

        let entry = windows
            .entry((client.to_string(), class))
            .or_insert(Window {
                started: now,
                attempts: 0,
            });

        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.attempts = 0;
        }

        if entry.attempts >= max_attempts {
            return ThrottleDecision::Limited;
        }

        entry.attempts += 1;
        ThrottleDecision::Allowed
    }
}
