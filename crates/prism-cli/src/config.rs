//! # CLI Configuration
//!
//! `prism.toml` holds the backend field layout plus a static stand-in for the
//! stream catalog and the permission service, so queries can be planned
//! offline. A missing file means defaults: no categories, every stream
//! readable.

use prism_core::BoxError;
use prism_engine::BackendSettings;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendSettings,
    /// Category name → stream ids.
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub permissions: PermissionConfig,
}

#[derive(Debug, Deserialize)]
pub struct PermissionConfig {
    #[serde(default = "default_allow_all")]
    pub allow_all: bool,
    #[serde(default)]
    pub allowed_streams: BTreeSet<String>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            allow_all: default_allow_all(),
            allowed_streams: BTreeSet::new(),
        }
    }
}

fn default_allow_all() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, BoxError> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        tracing::info!(
            "Loaded config from {} ({} categories)",
            path.display(),
            config.categories.len()
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Unknown categories resolve to nothing.
    pub fn resolve_categories(&self, categories: &BTreeSet<String>) -> Result<Vec<String>, BoxError> {
        Ok(categories
            .iter()
            .filter_map(|category| self.categories.get(category))
            .flatten()
            .cloned()
            .collect())
    }

    pub fn is_permitted(&self, stream: &str) -> Result<bool, BoxError> {
        Ok(self.permissions.allow_all || self.permissions.allowed_streams.contains(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_allow_everything() {
        let config = Config::parse("").unwrap();
        assert!(config.is_permitted("any").unwrap());
        assert!(config.categories.is_empty());
        assert_eq!(config.backend, BackendSettings::default());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [backend]
            streams_field = "routed_to"

            [categories]
            colors = ["red", "yellow", "blue"]
            numbers = ["one"]

            [permissions]
            allow_all = false
            allowed_streams = ["red"]
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.streams_field, "routed_to");
        assert_eq!(config.backend.timestamp_field, "timestamp");

        let resolved = config
            .resolve_categories(&BTreeSet::from(["colors".to_string(), "unknown".to_string()]))
            .unwrap();
        assert_eq!(resolved, vec!["red", "yellow", "blue"]);

        assert!(config.is_permitted("red").unwrap());
        assert!(!config.is_permitted("blue").unwrap());
    }
}
