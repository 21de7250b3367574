//! Claude Code CLI engine.
//!
//! Invokes `claude` in headless mode with stream-json output. When a tmux
//! session is requested the invocation is hosted in a detached session via
//! the multiplexer driver; otherwise stdout and stderr are streamed
//! directly.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{Engine, EngineOptions, EngineResult, SESSION_PREFIX};
use crate::config::ProjectPaths;
use crate::error::Result;
use crate::output::{StreamTotals, detect_error};
use crate::process::{LineSink, ProcessRunner, tmux};

pub struct ClaudeEngine;

impl ClaudeEngine {
    pub fn new() -> Self {
        Self
    }

    fn build_args(prompt: &str, options: &EngineOptions) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            prompt.to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];
        if let Some(model) = &options.model_override {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }
}

impl Default for ClaudeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for ClaudeEngine {
    fn name(&self) -> &'static str {
        "Claude Code"
    }

    fn command(&self) -> &'static str {
        "claude"
    }

    async fn execute(
        &self,
        prompt: &str,
        work_dir: &Path,
        options: &EngineOptions,
    ) -> Result<EngineResult> {
        let silent: LineSink = Arc::new(|_| {});
        self.execute_streaming(prompt, work_dir, silent, options)
            .await
    }

    async fn execute_streaming(
        &self,
        prompt: &str,
        work_dir: &Path,
        on_progress: LineSink,
        options: &EngineOptions,
    ) -> Result<EngineResult> {
        let args = Self::build_args(prompt, options);

        let totals = Arc::new(Mutex::new(StreamTotals::new()));
        let first_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let sink: LineSink = {
            let totals = Arc::clone(&totals);
            let first_error = Arc::clone(&first_error);
            Arc::new(move |line: &str| {
                totals.lock().ingest(line);
                {
                    let mut slot = first_error.lock();
                    if slot.is_none()
                        && let Some(message) = detect_error(line)
                    {
                        *slot = Some(message);
                    }
                }
                on_progress(line);
            })
        };

        let tmux_target = match (&options.agent_id, &options.task_slug) {
            (Some(agent_id), Some(slug)) if options.tmux => {
                Some(tmux::session_name(SESSION_PREFIX, agent_id, slug))
            }
            _ => None,
        };

        let exit_code = if let Some(session) = tmux_target {
            let tmp_dir = ProjectPaths::workspace_tmp_dir(work_dir);
            tmux::run_in_session(&session, self.command(), &args, work_dir, &tmp_dir, &sink)
                .await?
                .exit_code
        } else {
            ProcessRunner::execute_streaming(self.command(), &args, Some(work_dir), sink, &[])
                .await?
        };

        let totals = totals.lock().clone();
        let error = first_error.lock().clone();

        debug!(
            exit_code,
            input_tokens = totals.input_tokens,
            output_tokens = totals.output_tokens,
            had_error = error.is_some(),
            "claude execution finished"
        );

        let success = exit_code == 0 && error.is_none();
        let error = if success {
            None
        } else {
            error.or_else(|| Some(format!("claude exited with status {}", exit_code)))
        };

        Ok(EngineResult {
            success,
            response: totals.response(),
            input_tokens: totals.input_tokens,
            output_tokens: totals.output_tokens,
            cost: totals.cost,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_carry_headless_streaming_flags() {
        let args = ClaudeEngine::build_args("do the task", &EngineOptions::default());
        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "do the task");
        assert!(args.contains(&"--output-format".to_string()));
        assert!(args.contains(&"stream-json".to_string()));
        assert!(args.contains(&"--dangerously-skip-permissions".to_string()));
        assert!(!args.contains(&"--model".to_string()));
    }

    #[test]
    fn model_override_is_appended() {
        let options = EngineOptions {
            model_override: Some("opus".to_string()),
            ..Default::default()
        };
        let args = ClaudeEngine::build_args("x", &options);
        let idx = args.iter().position(|a| a == "--model").unwrap();
        assert_eq!(args[idx + 1], "opus");
    }
}
