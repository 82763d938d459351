use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Configuration for a [`crate::SyncEngine`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum time to wait for one source's entries.
    pub fetch_timeout: Duration,
    /// Recompute every fetched entry's id and drop the ones that do not
    /// match their content.
    pub verify_integrity: bool,
    /// Skip a source whose published head has not moved since the last
    /// pull.
    pub skip_unchanged: bool,
    /// Entries kept for retry while their target is missing from the tree.
    /// The oldest are dropped beyond this; `0` disables retrying.
    pub max_pending: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            verify_integrity: true,
            skip_unchanged: true,
            max_pending: 10_000,
        }
    }
}

impl SyncConfig {
    /// Parse a config from TOML; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.fetch_timeout.is_zero() {
            return Err(SyncError::Config("fetch_timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = SyncConfig::default();
        assert_eq!(c.fetch_timeout, Duration::from_secs(30));
        assert!(c.verify_integrity);
        assert!(c.skip_unchanged);
        assert_eq!(c.max_pending, 10_000);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn toml_overrides() {
        let c = SyncConfig::from_toml_str(
            "verify_integrity = false\nfetch_timeout = { secs = 2, nanos = 0 }",
        )
        .unwrap();
        assert!(!c.verify_integrity);
        assert_eq!(c.fetch_timeout, Duration::from_secs(2));
        assert!(c.skip_unchanged);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = SyncConfig::from_toml_str("fetch_timeout = { secs = 0, nanos = 0 }");
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
