//! Dynamic cluster settings consulted by storage adapters on every call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

/// Name of the session-reuse toggle.
pub const SESSION_REUSE_SETTING: &str = "cloudstorage.s3.session_reuse.enabled";

/// Name of the per-operation timeout setting.
pub const TIMEOUT_SETTING: &str = "cloudstorage.timeout";

const DEFAULT_SESSION_REUSE: bool = true;
const DEFAULT_TIMEOUT_SECS: u64 = 10 * 60;

/// Startup values for [`ClusterSettings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct SettingsConfig {
    /// Persist the last opened s3 session and re-use it when opening a new
    /// session with the same arguments
    #[cfg_attr(
        feature = "config",
        arg(
            long = "s3-session-reuse",
            env = "CLOUDSTORAGE_S3_SESSION_REUSE",
            default_value_t = DEFAULT_SESSION_REUSE,
            action = clap::ArgAction::Set
        )
    )]
    #[serde(default = "default_session_reuse")]
    pub s3_session_reuse: bool,

    /// Timeout in seconds for individual cloud storage operations
    #[cfg_attr(
        feature = "config",
        arg(
            long = "cloudstorage-timeout-secs",
            env = "CLOUDSTORAGE_TIMEOUT_SECS",
            default_value_t = DEFAULT_TIMEOUT_SECS
        )
    )]
    #[serde(default = "default_timeout_secs")]
    pub cloudstorage_timeout_secs: u64,
}

fn default_session_reuse() -> bool {
    DEFAULT_SESSION_REUSE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            s3_session_reuse: DEFAULT_SESSION_REUSE,
            cloudstorage_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug)]
struct Values {
    session_reuse: AtomicBool,
    timeout_millis: AtomicU64,
}

/// Shared handle to the live settings values.
///
/// Clones observe the same values, so an update made through any handle is
/// seen by every adapter on its next call.
#[derive(Debug, Clone)]
pub struct ClusterSettings(Arc<Values>);

impl Default for ClusterSettings {
    fn default() -> Self {
        Self::from_config(&SettingsConfig::default())
    }
}

impl ClusterSettings {
    /// Creates settings initialized from `config`.
    pub fn from_config(config: &SettingsConfig) -> Self {
        let timeout = Duration::from_secs(config.cloudstorage_timeout_secs);
        Self(Arc::new(Values {
            session_reuse: AtomicBool::new(config.s3_session_reuse),
            timeout_millis: AtomicU64::new(timeout.as_millis() as u64),
        }))
    }

    /// Returns whether adapters should share the cached session.
    #[inline]
    pub fn session_reuse_enabled(&self) -> bool {
        self.0.session_reuse.load(Ordering::Relaxed)
    }

    /// Toggles session reuse.
    pub fn set_session_reuse(&self, enabled: bool) {
        self.0.session_reuse.store(enabled, Ordering::Relaxed);
    }

    /// Returns the current per-operation timeout.
    #[inline]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.0.timeout_millis.load(Ordering::Relaxed))
    }

    /// Updates the per-operation timeout.
    pub fn set_operation_timeout(&self, timeout: Duration) {
        self.0
            .timeout_millis
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = ClusterSettings::default();
        assert!(settings.session_reuse_enabled());
        assert_eq!(settings.operation_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn updates_are_shared_between_clones() {
        let settings = ClusterSettings::default();
        let other = settings.clone();

        other.set_session_reuse(false);
        other.set_operation_timeout(Duration::from_millis(250));

        assert!(!settings.session_reuse_enabled());
        assert_eq!(settings.operation_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let config: SettingsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SettingsConfig::default());
    }
}
