use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::FleetEvent;
use crate::config::NotificationConfig;

#[derive(Clone)]
pub struct Notifier {
    config: NotificationConfig,
    logs_dir: Option<PathBuf>,
}

impl Notifier {
    pub fn new(config: NotificationConfig, logs_dir: Option<PathBuf>) -> Self {
        Self { config, logs_dir }
    }

    /// A disabled notifier, e.g. for dry runs and tests.
    pub fn disabled() -> Self {
        Self {
            config: NotificationConfig {
                enabled: false,
                ..Default::default()
            },
            logs_dir: None,
        }
    }

    pub async fn notify(&self, event: &FleetEvent) {
        if !self.config.enabled {
            return;
        }

        if self.config.desktop && event.event_type.is_run_level() {
            self.send_desktop_notification(event).await;
        }

        if self.config.event_log {
            self.write_event_log(event).await;
        }

        if let Some(hook) = &self.config.hook_command {
            self.run_hook(hook, event).await;
        }
    }

    async fn send_desktop_notification(&self, event: &FleetEvent) {
        let title = event.title();
        let body = event.body();

        #[cfg(target_os = "macos")]
        {
            let script = format!(
                r#"display notification "{}" with title "{}""#,
                body.replace('"', r#"\""#).replace('\n', " "),
                title.replace('"', r#"\""#)
            );

            let result = Command::new("osascript")
                .args(["-e", &script])
                .output()
                .await;

            if let Err(e) = result {
                debug!(error = %e, "Failed to send desktop notification");
            }
        }

        #[cfg(target_os = "linux")]
        {
            let result = Command::new("notify-send")
                .args([&title, &body])
                .output()
                .await;

            if let Err(e) = result {
                debug!(error = %e, "Failed to send desktop notification");
            }
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            let _ = (title, body);
        }
    }

    async fn write_event_log(&self, event: &FleetEvent) {
        let Some(logs_dir) = &self.logs_dir else {
            return;
        };

        let log_path = logs_dir.join("events.log");
        let log_line = format!(
            "[{}] {}: {}\n",
            event.timestamp,
            event.event_type.as_str(),
            event.body()
        );

        if let Err(e) = tokio::fs::create_dir_all(logs_dir).await {
            warn!(error = %e, "Failed to create logs directory");
            return;
        }

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await;

        match result {
            Ok(mut file) => {
                if let Err(e) = file.write_all(log_line.as_bytes()).await {
                    warn!(error = %e, "Failed to write event log");
                } else if let Err(e) = file.flush().await {
                    warn!(error = %e, "Failed to flush event log");
                }
            }
            Err(e) => {
                warn!(error = %e, path = %log_path.display(), "Failed to open event log");
            }
        }
    }

    async fn run_hook(&self, hook_cmd: &str, event: &FleetEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(_) => return,
        };

        let result = Command::new("sh")
            .args(["-c", hook_cmd])
            .env("FLEET_EVENT", event.event_type.as_str())
            .env("FLEET_EVENT_JSON", &json)
            .output()
            .await;

        if let Err(e) = result {
            debug!(error = %e, hook = %hook_cmd, "Failed to run hook");
        }
    }
}
