//! Configuration loading and well-known project paths.

mod paths;
mod settings;

pub use paths::{METADATA_DIR, ProjectPaths};
pub use settings::{
    CONFIG_FILE, EngineConfig, FleetConfig, GitConfig, NotificationConfig, OrchestratorConfig,
    RetryConfig,
};
