//! Engine adapter: the contract a pluggable AI CLI must satisfy.

mod claude;
mod codex;

pub use claude::ClaudeEngine;
pub use codex::CodexEngine;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{FleetError, Result};
use crate::process::{LineSink, ProcessRunner};

/// Multiplexer session prefix; fixed product string, part of the session
/// name contract `^fleet-[a-z0-9-]+-[a-z0-9-]+$`.
pub const SESSION_PREFIX: &str = "fleet";

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub model_override: Option<String>,
    /// Host the invocation in a detached tmux session so a human can attach.
    pub tmux: bool,
    pub agent_id: Option<String>,
    pub task_slug: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineResult {
    pub success: bool,
    pub response: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: Option<f64>,
    pub error: Option<String>,
}

impl EngineResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cost: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// Display name.
    fn name(&self) -> &'static str;

    /// Command-line executable name.
    fn command(&self) -> &'static str;

    async fn is_available(&self) -> bool {
        ProcessRunner::exists(self.command())
    }

    /// Blocking execution: run the prompt to completion in `work_dir`.
    async fn execute(
        &self,
        prompt: &str,
        work_dir: &Path,
        options: &EngineOptions,
    ) -> Result<EngineResult>;

    /// Streaming execution; engines without a streaming mode fall back to
    /// the blocking call.
    async fn execute_streaming(
        &self,
        prompt: &str,
        work_dir: &Path,
        on_progress: LineSink,
        options: &EngineOptions,
    ) -> Result<EngineResult> {
        let _ = on_progress;
        self.execute(prompt, work_dir, options).await
    }
}

/// Supported engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Claude,
    Codex,
}

impl EngineKind {
    pub fn create(self) -> Arc<dyn Engine> {
        match self {
            Self::Claude => Arc::new(ClaudeEngine::new()),
            Self::Codex => Arc::new(CodexEngine::new()),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claude => write!(f, "claude"),
            Self::Codex => write!(f, "codex"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            other => Err(FleetError::Config(format!("unknown engine: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_kind_round_trips_through_strings() {
        assert_eq!("claude".parse::<EngineKind>().unwrap(), EngineKind::Claude);
        assert_eq!("Codex".parse::<EngineKind>().unwrap(), EngineKind::Codex);
        assert!("gpt".parse::<EngineKind>().is_err());
        assert_eq!(EngineKind::Claude.to_string(), "claude");
    }

    #[test]
    fn factory_produces_matching_commands() {
        assert_eq!(EngineKind::Claude.create().command(), "claude");
        assert_eq!(EngineKind::Codex.create().command(), "codex");
    }
}
