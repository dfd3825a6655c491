use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_bridge::BridgeConfig;
use strata_maintenance::MaintenanceConfig;
use strata_partition::RegistryConfig;
use strata_resolver::ResolverConfig;

use crate::error::{SdkError, SdkResult};

/// Configuration of a whole node. Every section is optional in TOML and
/// falls back to its defaults.
///
/// ```toml
/// [bridge]
/// mode = "log"
/// log_dir = "/var/lib/strata"
///
/// [resolver]
/// parent_free_types = ["Account"]
///
/// [maintenance]
/// window_ms = 8000
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub bridge: BridgeConfig,
    pub registry: RegistryConfig,
    pub resolver: ResolverConfig,
    pub maintenance: MaintenanceConfig,
}

impl NodeConfig {
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Reject settings no node can run with.
    pub fn validate(&self) -> SdkResult<()> {
        if self.resolver.partitions == 0 {
            return Err(SdkError::Config("resolver.partitions must be at least 1".into()));
        }
        if self.resolver.topic.is_empty() {
            return Err(SdkError::Config("resolver.topic must not be empty".into()));
        }
        if self.registry.max_partitions == 0 {
            return Err(SdkError::Config("registry.max_partitions must be at least 1".into()));
        }
        Ok(())
    }
}
