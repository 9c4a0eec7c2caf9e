//! Configuration-based container bootstrap

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::cache::SingletonMap;
use crate::container::Container;
use crate::error::{DiError, DiResult};
use crate::scope::Scope;

/// Declarative container setup.
///
/// Singletons are keyed by owned `String`s, so look them up with
/// `String` keys, not `&str`. Values stay as `serde_json::Value`; resolve
/// them with `get_as::<serde_json::Value>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Scopes to create, in order
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Singletons to add, keyed by name
    #[serde(default)]
    pub singletons: HashMap<String, serde_json::Value>,
    /// Freeze the container once everything is applied
    #[serde(default)]
    pub freeze: bool,
}

impl ContainerConfig {
    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> DiResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| DiError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from JSON string
    pub fn from_json(json_str: &str) -> DiResult<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| DiError::Config(format!("Failed to parse JSON: {}", e)))
    }

    /// Apply configuration to a container, returning the created scopes.
    ///
    /// Singletons are added in one batch, so a duplicate key leaves none of
    /// them added. Scopes created before a failure stay created.
    pub fn apply(&self, container: &Container) -> DiResult<Vec<Scope>> {
        let scopes = self
            .scopes
            .iter()
            .map(|name| container.create_scope(name))
            .collect::<DiResult<Vec<_>>>()?;

        if !self.singletons.is_empty() {
            let singletons: SingletonMap = self
                .singletons
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            container.add_singletons(singletons)?;
        }

        if self.freeze {
            container.freeze();
        }

        debug!(
            "Applied configuration: {} scope(s), {} singleton(s)",
            scopes.len(),
            self.singletons.len()
        );
        Ok(scopes)
    }
}

/// Configuration builder
pub struct ConfigBuilder {
    config: ContainerConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
        }
    }

    pub fn add_scope(&mut self, name: impl Into<String>) -> &mut Self {
        self.config.scopes.push(name.into());
        self
    }

    pub fn add_singleton(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> &mut Self {
        self.config.singletons.insert(key.into(), value.into());
        self
    }

    pub fn freeze(&mut self, freeze: bool) -> &mut Self {
        self.config.freeze = freeze;
        self
    }

    /// Build the configuration
    pub fn build(&self) -> ContainerConfig {
        self.config.clone()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// Example configuration file format:
// ```toml
// scopes = ["request", "session"]
// freeze = true
//
// [singletons]
// app_name = "keystone"
// max_connections = 16
// ```
