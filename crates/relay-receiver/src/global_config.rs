//! Live node identity and signing secret.
//!
//! The receiver never caches these values: the provider is asked again on
//! every connection open and every validation, so a rotated secret applies
//! to the next inbound request.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Snapshot of the process-wide configuration the receiver depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub signing_key: Option<String>,
    /// This node's identity, sent in the auth frame.
    #[serde(default)]
    pub target_id: String,
}

impl GlobalConfig {
    /// The signing secret, if one is configured and non-empty.
    pub fn signing_key(&self) -> Option<&str> {
        self.signing_key.as_deref().filter(|key| !key.is_empty())
    }

    /// Account and cluster, only when both are present.
    pub fn claimed_identity(&self) -> Option<(&str, &str)> {
        let account_id = self.account_id.as_deref().filter(|s| !s.is_empty())?;
        let cluster_name = self.cluster_name.as_deref().filter(|s| !s.is_empty())?;
        Some((account_id, cluster_name))
    }
}

/// Read-only source of the current [`GlobalConfig`].
///
/// Called frequently; implementations must be cheap and return current
/// values.
pub trait GlobalConfigProvider: Send + Sync {
    fn global_config(&self) -> GlobalConfig;
}

impl<F> GlobalConfigProvider for F
where
    F: Fn() -> GlobalConfig + Send + Sync,
{
    fn global_config(&self) -> GlobalConfig {
        self()
    }
}

/// Provider returning a fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticGlobalConfig(pub GlobalConfig);

impl GlobalConfigProvider for StaticGlobalConfig {
    fn global_config(&self) -> GlobalConfig {
        self.0.clone()
    }
}

/// Provider that re-reads a JSON file on every call.
///
/// A missing or unparseable file yields a snapshot without a signing key,
/// so validation fails closed until the file is fixed.
#[derive(Debug, Clone)]
pub struct FileGlobalConfig {
    path: PathBuf,
    fallback_target_id: String,
}

impl FileGlobalConfig {
    pub fn new(path: impl Into<PathBuf>, fallback_target_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fallback_target_id: fallback_target_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<GlobalConfig, String> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| e.to_string())?;
        serde_json::from_str(&content).map_err(|e| e.to_string())
    }
}

impl GlobalConfigProvider for FileGlobalConfig {
    fn global_config(&self) -> GlobalConfig {
        let mut config = match self.load() {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read global config");
                GlobalConfig::default()
            }
        };
        if config.target_id.is_empty() {
            config.target_id = self.fallback_target_id.clone();
        }
        config
    }
}
