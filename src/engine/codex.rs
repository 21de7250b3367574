//! Codex CLI engine. Blocking execution only; streaming falls back.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::{Engine, EngineOptions, EngineResult};
use crate::error::Result;
use crate::process::ProcessRunner;

pub struct CodexEngine;

impl CodexEngine {
    pub fn new() -> Self {
        Self
    }

    fn build_args(prompt: &str, options: &EngineOptions) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "--dangerously-bypass-approvals-and-sandbox".to_string(),
        ];
        if let Some(model) = &options.model_override {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push(prompt.to_string());
        args
    }
}

impl Default for CodexEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for CodexEngine {
    fn name(&self) -> &'static str {
        "Codex"
    }

    fn command(&self) -> &'static str {
        "codex"
    }

    async fn execute(
        &self,
        prompt: &str,
        work_dir: &Path,
        options: &EngineOptions,
    ) -> Result<EngineResult> {
        let args = Self::build_args(prompt, options);
        let output = ProcessRunner::execute(self.command(), &args, Some(work_dir), &[]).await?;

        debug!(exit_code = output.exit_code, "codex execution finished");

        if output.success() {
            Ok(EngineResult {
                success: true,
                response: output.stdout.trim().to_string(),
                input_tokens: 0,
                output_tokens: 0,
                cost: None,
                error: None,
            })
        } else {
            let stderr = output.stderr.trim();
            let error = if stderr.is_empty() {
                format!("codex exited with status {}", output.exit_code)
            } else {
                stderr.to_string()
            };
            Ok(EngineResult::failure(error))
        }
    }
}
