//! Failed-login throttling

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Login throttling thresholds
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Failures allowed inside one window before a ban
    pub max_attempts: u32,
    /// Window in which failures are counted
    pub window: Duration,
    /// How long a banned key stays refused
    pub ban_duration: Duration,
}

#[derive(Debug)]
struct FailureRecord {
    failures: u32,
    window_start: Instant,
    ban_expires: Option<Instant>,
}

/// Counts failed logins per identifier and bans repeat offenders
#[derive(Debug, Clone)]
pub struct LoginThrottle {
    config: ThrottleConfig,
    records: Arc<Mutex<HashMap<String, FailureRecord>>>,
}

impl LoginThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// False while `key` is banned.
    pub async fn check(&self, key: &str) -> bool {
        let mut records = self.records.lock().await;
        let now = Instant::now();

        match records.get(key).and_then(|record| record.ban_expires) {
            Some(ban_expires) if now < ban_expires => false,
            Some(_) => {
                debug!("Ban on {} lifted", key);
                records.remove(key);
                true
            }
            None => true,
        }
    }

    pub async fn record_failure(&self, key: &str) {
        let mut records = self.records.lock().await;
        let now = Instant::now();
        self.evict_stale(&mut records, now);

        let record = records.entry(key.to_string()).or_insert(FailureRecord {
            failures: 0,
            window_start: now,
            ban_expires: None,
        });

        if now.duration_since(record.window_start) >= self.config.window {
            record.failures = 0;
            record.window_start = now;
        }

        record.failures += 1;
        if record.failures >= self.config.max_attempts && record.ban_expires.is_none() {
            record.ban_expires = Some(now + self.config.ban_duration);
            warn!(
                "Banned login key {} for {} seconds after {} failures",
                key,
                self.config.ban_duration.as_secs(),
                record.failures
            );
        }
    }

    /// Drop records whose ban has lifted or whose window has lapsed unbanned.
    fn evict_stale(&self, records: &mut HashMap<String, FailureRecord>, now: Instant) {
        let before = records.len();
        records.retain(|_, record| match record.ban_expires {
            Some(ban_expires) => now < ban_expires,
            None => now.duration_since(record.window_start) < self.config.window,
        });

        let evicted = before - records.len();
        if evicted > 0 {
            debug!("Evicted {} stale login records", evicted);
        }
    }

    /// Forget the failures of `key`, typically after a successful login.
    pub async fn reset(&self, key: &str) {
        self.records.lock().await.remove(key);
    }
}
