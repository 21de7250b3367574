use std::path::PathBuf;

use thiserror::Error;

/// Classified engine failure, parsed from the error string an engine
/// reports. Only unambiguous signatures are matched; anything else is
/// `Other` and treated as permanent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFailure {
    RateLimited,
    ServerError(String),
    NetworkError(String),
    Timeout(String),
    Other(String),
}

impl EngineFailure {
    pub fn from_message(msg: &str) -> Self {
        let lower = msg.to_lowercase();

        if lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("rate limit")
        {
            return Self::RateLimited;
        }

        if lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
            || lower.contains("overloaded")
            || lower.contains("internal server error")
        {
            return Self::ServerError(msg.to_string());
        }

        if lower.contains("econnreset")
            || lower.contains("econnrefused")
            || lower.contains("etimedout")
            || lower.contains("epipe")
            || lower.contains("socket hang up")
            || lower.contains("network")
            || lower.contains("connection reset")
            || lower.contains("connection refused")
        {
            return Self::NetworkError(msg.to_string());
        }

        if lower.contains("timed out") || lower.contains("timeout") {
            return Self::Timeout(msg.to_string());
        }

        Self::Other(msg.to_string())
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Git error: {0}")]
    Git(String),

    #[error("Worktree error: {message}")]
    Worktree { message: String, path: PathBuf },

    #[error("Engine '{0}' not found on PATH")]
    EngineNotFound(String),

    #[error("Engine execution failed: {0}")]
    EngineExecution(String),

    #[error("Task source error: {0}")]
    TaskSource(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not in a git repository")]
    NotInGitRepo,

    #[error("Project not initialized. Run 'claude-fleet init' first.")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FleetError>;
