use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};

/// Configuration for a replicated tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Id of the root folder. Peers sharing a tree must agree on it.
    pub root_id: String,
    /// Display name of the root folder.
    pub root_name: String,
    /// Separator between a parent id and a child name in derived child ids.
    pub id_separator: String,
    /// Maximum length of an item name, in bytes.
    pub max_name_len: usize,
    /// Changes buffered per watcher before a slow receiver lags.
    pub watch_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            root_id: "root".into(),
            root_name: "Root".into(),
            id_separator: "/".into(),
            max_name_len: 255,
            watch_capacity: 64,
        }
    }
}

impl TreeConfig {
    /// Parse a configuration from TOML; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> TreeResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| TreeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> TreeResult<()> {
        if self.root_id.trim().is_empty() {
            return Err(TreeError::Config("root_id must not be blank".into()));
        }
        if self.id_separator.is_empty() {
            return Err(TreeError::Config("id_separator must not be empty".into()));
        }
        if self.max_name_len == 0 {
            return Err(TreeError::Config("max_name_len must be positive".into()));
        }
        if self.watch_capacity == 0 {
            return Err(TreeError::Config("watch_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Id of the child named `name` inside the folder `parent_id`.
    ///
    /// Deterministic, so peers creating the same path agree on the id.
    pub fn child_id(&self, parent_id: &str, name: &str) -> String {
        format!("{parent_id}{}{name}", self.id_separator)
    }

    /// Validate an item name.
    pub fn validate_name(&self, name: &str) -> TreeResult<()> {
        let invalid = |reason: &str| TreeError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.trim().is_empty() {
            return Err(invalid("name is blank"));
        }
        if name.contains(self.id_separator.as_str()) {
            return Err(invalid("name contains the id separator"));
        }
        if name.len() > self.max_name_len {
            return Err(invalid("name is too long"));
        }
        if name.chars().any(char::is_control) {
            return Err(invalid("name contains control characters"));
        }
        Ok(())
    }
}
