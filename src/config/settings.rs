use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{FleetError, Result};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub orchestrator: OrchestratorConfig,
    pub retry: RetryConfig,
    pub engine: EngineConfig,
    pub git: GitConfig,
    pub notification: NotificationConfig,
}

impl FleetConfig {
    pub async fn load(fleet_dir: &Path) -> Result<Self> {
        let config_path = fleet_dir.join(CONFIG_FILE);
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, fleet_dir: &Path) -> Result<()> {
        self.validate()?;
        let config_path = fleet_dir.join(CONFIG_FILE);
        let content =
            toml::to_string_pretty(self).map_err(|e| FleetError::Config(e.to_string()))?;
        fs::write(&config_path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.orchestrator.max_parallel == 0 {
            errors.push("orchestrator.max_parallel must be greater than 0");
        }

        if self.engine.kind.is_empty() {
            errors.push("engine.kind must not be empty");
        }

        if self.git.branch_prefix.is_empty() {
            errors.push("git.branch_prefix must not be empty");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FleetError::Config(errors.join("; ")))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of agents in flight per batch.
    pub max_parallel: usize,
    /// Maximum number of batch iterations; 0 means run until drained.
    pub max_iterations: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            max_iterations: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Additional attempts after the first, for transient engine errors.
    pub max_retries: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: String,
    pub model: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: "claude".to_string(),
            model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub branch_prefix: String,
    /// Merge target; empty means the branch the orchestrator started on.
    pub base_branch: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            branch_prefix: "fleet/".to_string(),
            base_branch: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub desktop: bool,
    pub event_log: bool,
    pub hook_command: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            desktop: false,
            event_log: true,
            hook_command: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(FleetConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_parallel_is_rejected() {
        let mut config = FleetConfig::default();
        config.orchestrator.max_parallel = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: FleetConfig = toml::from_str("[orchestrator]\nmax_parallel = 8\n").unwrap();
        assert_eq!(config.orchestrator.max_parallel, 8);
        assert_eq!(config.engine.kind, "claude");
        assert_eq!(config.git.branch_prefix, "fleet/");
    }
}
