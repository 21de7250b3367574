use console::{Style, style};

use crate::state::{AgentStatus, FleetState};

pub struct Display;

impl Display {
    pub fn new() -> Self {
        Self
    }

    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", style(text).bold().cyan());
        println!("{}", style("═".repeat(60)).dim());
        println!();
    }

    pub fn print_success(&self, text: &str) {
        println!("{} {}", style("✓").green().bold(), text);
    }

    pub fn print_info(&self, text: &str) {
        println!("{} {}", style("·").dim(), text);
    }

    pub fn print_warning(&self, text: &str) {
        println!("{} {}", style("!").yellow().bold(), text);
    }

    pub fn print_error(&self, text: &str) {
        eprintln!("{} {}", style("✗").red().bold(), text);
    }

    pub fn print_state(&self, state: &FleetState) {
        let summary = &state.summary;
        println!(
            "Tasks: {} total, {} completed, {} failed, {} in progress",
            summary.total,
            style(summary.completed).green(),
            style(summary.failed).red(),
            style(summary.in_progress).yellow(),
        );
        println!();

        if state.agents.is_empty() {
            self.print_info("No agents recorded.");
            return;
        }

        for (id, record) in &state.agents {
            let status_style = self.status_style(record.status);
            println!(
                "  #{:<3} {:<10} {:<20} {}",
                style(id).bold(),
                status_style.apply_to(format!("{:?}", record.status).to_lowercase()),
                record.step,
                record.task_title,
            );
            if let Some(session) = &record.tmux_session {
                println!("       {}", style(format!("tmux attach -t {}", session)).dim());
            }
            if let Some(error) = &record.error {
                println!("       {}", style(error).red().dim());
            }
        }
        println!();
        println!("{}", style(format!("Last update: {}", state.last_update)).dim());
    }

    fn status_style(&self, status: AgentStatus) -> Style {
        match status {
            AgentStatus::Pending => Style::new().dim(),
            AgentStatus::Running => Style::new().yellow(),
            AgentStatus::Completed => Style::new().green(),
            AgentStatus::Failed => Style::new().red(),
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}
