//! Application configuration file.
//!
//! Every section is optional; missing sections and fields take their
//! defaults. Command-line flags are applied on top.

use std::path::{Path, PathBuf};

use anyhow::Context;
use cybersafe_core::{NotificationConfig, SafetyPolicy, WorkerConfig};
use cybersafe_server::ServerConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub policy: SafetyPolicy,
    pub notifications: NotificationConfig,
    pub worker: WorkerConfig,
    pub server: ServerConfig,
}

/// Values from the command line that win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
}

impl AppConfig {
    /// Reads a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Reads the file if one was given, otherwise returns defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Applies command-line overrides.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(db_path) = overrides.db_path {
            self.server.db_path = Some(db_path);
        }
        self
    }

    /// Checks the sections that have invariants.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.policy.validate().context("invalid safety policy")?;
        if self.notifications.timeout_secs == 0 {
            anyhow::bail!("notifications.timeout_secs must be positive");
        }
        if self.worker.max_in_flight == 0 {
            anyhow::bail!("worker.max_in_flight must be positive");
        }
        Ok(())
    }
}
