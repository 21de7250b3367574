use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptFlags {
    pub skip_tests: bool,
    pub skip_lint: bool,
    pub browser: bool,
}

/// Builds the prompt handed to the engine for one task.
#[derive(Debug, Default)]
pub struct PromptBuilder {
    requirements_hint: Option<String>,
}

impl PromptBuilder {
    pub fn new(requirements_path: Option<&Path>) -> Self {
        Self {
            requirements_hint: requirements_path.map(|p| p.display().to_string()),
        }
    }

    pub fn build_task_prompt(&self, task_title: &str, flags: &PromptFlags) -> String {
        let mut parts = Vec::new();

        parts.push(format!(
            r#"# Task: {task_title}

You are working in an isolated git worktree on a dedicated branch. Implement
this task completely."#
        ));

        if let Some(hint) = &self.requirements_hint {
            parts.push(format!(
                "The project requirements are available at `{}` (copied into this worktree).",
                hint
            ));
        }

        let mut workflow = vec![
            "Read the relevant code before changing it.".to_string(),
            "Implement the task, following existing patterns and conventions.".to_string(),
        ];
        if !flags.skip_tests {
            workflow.push("Run the test suite and make it pass.".to_string());
        }
        if !flags.skip_lint {
            workflow.push("Run the linter and fix what it reports.".to_string());
        }
        if flags.browser {
            workflow.push(
                "You may use a browser to verify user-facing behavior.".to_string(),
            );
        }
        workflow
            .push("Stage and commit all of your work with a descriptive message.".to_string());

        let steps = workflow
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n");

        parts.push(format!("## Workflow\n\n{}", steps));
        parts.push(
            "Do not touch unrelated code. Your branch will be merged automatically once you \
             are done."
                .to_string(),
        );

        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn prompt_names_the_task_and_commit_step() {
        let builder = PromptBuilder::default();
        let prompt = builder.build_task_prompt("Fix login flow", &PromptFlags::default());
        assert!(prompt.contains("# Task: Fix login flow"));
        assert!(prompt.contains("commit all of your work"));
        assert!(prompt.contains("test suite"));
        assert!(prompt.contains("linter"));
    }

    #[test]
    fn skip_flags_drop_their_sections() {
        let builder = PromptBuilder::default();
        let flags = PromptFlags {
            skip_tests: true,
            skip_lint: true,
            browser: false,
        };
        let prompt = builder.build_task_prompt("T", &flags);
        assert!(!prompt.contains("test suite"));
        assert!(!prompt.contains("linter"));
        assert!(!prompt.contains("browser"));
    }

    #[test]
    fn requirements_hint_is_included_when_set() {
        let builder = PromptBuilder::new(Some(&PathBuf::from("docs/tasks.md")));
        let prompt = builder.build_task_prompt("T", &PromptFlags::default());
        assert!(prompt.contains("docs/tasks.md"));
    }
}
