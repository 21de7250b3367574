//! Classification of an engine's streamed JSON output.
//!
//! Engines emit one JSON record per line. Three independent questions are
//! answered from those lines: what is the agent currently doing (step
//! label), did the engine report an error, and what did the final result
//! carry (response text, token usage, cost).

use serde_json::Value;

pub const STEP_READING: &str = "Reading code";
pub const STEP_COMMITTING: &str = "Committing";
pub const STEP_STAGING: &str = "Staging";
pub const STEP_LINTING: &str = "Linting";
pub const STEP_TESTING: &str = "Testing";
pub const STEP_WRITING_TESTS: &str = "Writing tests";
pub const STEP_IMPLEMENTING: &str = "Implementing";

const DEFAULT_RESPONSE: &str = "Task completed";

const LINT_MARKERS: [&str; 4] = ["lint", "eslint", "biome", "prettier"];
const TEST_MARKERS: [&str; 6] = ["vitest", "jest", "bun test", "npm test", "pytest", "go test"];
const TEST_FILE_MARKERS: [&str; 4] = [".test.", ".spec.", "__tests__", "_test.go"];

/// Parse a streamed line as a JSON record. Only lines whose first
/// non-whitespace character is `{` qualify.
fn parse_record(line: &str) -> Option<Value> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(Value::is_object)
}

/// Find the first string value under any of `keys` (case-insensitive),
/// searching nested objects and arrays depth-first. Handles both flat probe
/// records and the nested shapes real stream output uses.
fn find_str(value: &Value, keys: &[&str]) -> Option<String> {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if keys.iter().any(|key| k.eq_ignore_ascii_case(key))
                    && let Some(s) = v.as_str()
                {
                    return Some(s.to_string());
                }
            }
            map.values().find_map(|v| find_str(v, keys))
        }
        Value::Array(items) => items.iter().find_map(|v| find_str(v, keys)),
        _ => None,
    }
}

fn record_kind(record: &Value) -> Option<&str> {
    record.get("type").and_then(Value::as_str)
}

/// Derive a step label from one streamed line. Rules are checked in
/// priority order; a read of a test file classifies as reading, not test
/// authoring. Returns `None` when the line carries no step information.
pub fn detect_step(line: &str) -> Option<&'static str> {
    let record = parse_record(line)?;

    let tool = find_str(&record, &["tool", "name", "tool_name"]).map(|s| s.to_lowercase());
    let command = find_str(&record, &["command"]).map(|s| s.to_lowercase());
    let file_path =
        find_str(&record, &["file_path", "filePath", "path"]).map(|s| s.to_lowercase());
    let description = find_str(&record, &["description"]).map(|s| s.to_lowercase());

    let tool = tool.as_deref();
    let command = command.as_deref().unwrap_or("");
    let description = description.as_deref().unwrap_or("");

    if matches!(tool, Some("read" | "glob" | "grep")) {
        return Some(STEP_READING);
    }
    if command.contains("git commit") || description.contains("git commit") {
        return Some(STEP_COMMITTING);
    }
    if command.contains("git add") || description.contains("git add") {
        return Some(STEP_STAGING);
    }
    if LINT_MARKERS.iter().any(|m| command.contains(m)) {
        return Some(STEP_LINTING);
    }
    if TEST_MARKERS.iter().any(|m| command.contains(m)) {
        return Some(STEP_TESTING);
    }
    if matches!(tool, Some("write" | "edit")) {
        let is_test_file = file_path
            .as_deref()
            .is_some_and(|p| TEST_FILE_MARKERS.iter().any(|m| p.contains(m)));
        if is_test_file {
            return Some(STEP_WRITING_TESTS);
        }
        return Some(STEP_IMPLEMENTING);
    }

    None
}

/// Error message from an `error` record: `error.message`, else `message`,
/// else a generic fallback. `None` for every other line.
pub fn detect_error(line: &str) -> Option<String> {
    let record = parse_record(line)?;
    if record_kind(&record) != Some("error") {
        return None;
    }

    let message = record
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| record.get("message").and_then(Value::as_str))
        .unwrap_or("Unknown error");

    Some(message.to_string())
}

/// Accumulated totals from `result` records; the last one wins.
#[derive(Debug, Default, Clone)]
pub struct StreamTotals {
    response: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: Option<f64>,
}

impl StreamTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, line: &str) {
        let Some(record) = parse_record(line) else {
            return;
        };
        if record_kind(&record) != Some("result") {
            return;
        }

        self.response = Some(
            record
                .get("result")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_RESPONSE)
                .to_string(),
        );

        if let Some(usage) = record.get("usage") {
            self.input_tokens = usage
                .get("input_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            self.output_tokens = usage
                .get("output_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0);
        }

        self.cost = record
            .get("total_cost_usd")
            .and_then(Value::as_f64)
            .or(self.cost);
    }

    pub fn saw_result(&self) -> bool {
        self.response.is_some()
    }

    pub fn response(&self) -> String {
        self.response
            .clone()
            .unwrap_or_else(|| DEFAULT_RESPONSE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_of_test_file_is_reading_not_writing_tests() {
        let line = r#"{"tool":"Read","file_path":"src/foo.test.ts"}"#;
        assert_eq!(detect_step(line), Some(STEP_READING));
    }

    #[test]
    fn write_to_test_file_is_writing_tests() {
        let line = r#"{"tool":"Write","file_path":"src/foo.test.ts"}"#;
        assert_eq!(detect_step(line), Some(STEP_WRITING_TESTS));
    }

    #[test]
    fn write_to_source_file_is_implementing() {
        assert_eq!(
            detect_step(r#"{"tool":"Edit","file_path":"src/foo.ts"}"#),
            Some(STEP_IMPLEMENTING)
        );
    }

    #[test]
    fn lint_command_is_linting() {
        assert_eq!(
            detect_step(r#"{"command":"bunx biome check ."}"#),
            Some(STEP_LINTING)
        );
    }

    #[test]
    fn test_runner_commands_are_testing() {
        assert_eq!(
            detect_step(r#"{"command":"go test ./..."}"#),
            Some(STEP_TESTING)
        );
        assert_eq!(
            detect_step(r#"{"command":"bun test --watch"}"#),
            Some(STEP_TESTING)
        );
    }

    #[test]
    fn git_commit_outranks_lint_and_test_markers() {
        // "git commit" is checked before the command-content rules.
        let line = r#"{"command":"git commit -m 'fix lint and jest config'"}"#;
        assert_eq!(detect_step(line), Some(STEP_COMMITTING));
    }

    #[test]
    fn git_add_in_description_is_staging() {
        assert_eq!(
            detect_step(r#"{"tool":"Bash","description":"git add changed files"}"#),
            Some(STEP_STAGING)
        );
    }

    #[test]
    fn nested_tool_use_record_classifies() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Grep","input":{"pattern":"foo"}}]}}"#;
        assert_eq!(detect_step(line), Some(STEP_READING));
    }

    #[test]
    fn non_json_and_unknown_lines_are_null() {
        assert_eq!(detect_step("plain progress text"), None);
        assert_eq!(detect_step(r#"{"type":"system","subtype":"init"}"#), None);
        assert_eq!(detect_step(r#"{"tool":"WebFetch","url":"x"}"#), None);
    }

    #[test]
    fn classifier_is_deterministic() {
        let line = r#"{"tool":"Write","file_path":"a/__tests__/b.ts","command":"eslint ."}"#;
        let first = detect_step(line);
        for _ in 0..10 {
            assert_eq!(detect_step(line), first);
        }
    }

    #[test]
    fn error_record_prefers_nested_message() {
        let line = r#"{"type":"error","error":{"message":"boom"},"message":"outer"}"#;
        assert_eq!(detect_error(line), Some("boom".to_string()));
    }

    #[test]
    fn error_record_falls_back_to_flat_message_then_unknown() {
        assert_eq!(
            detect_error(r#"{"type":"error","message":"flat"}"#),
            Some("flat".to_string())
        );
        assert_eq!(
            detect_error(r#"{"type":"error"}"#),
            Some("Unknown error".to_string())
        );
        assert_eq!(detect_error(r#"{"type":"result","result":"ok"}"#), None);
        assert_eq!(detect_error("not json"), None);
    }

    #[test]
    fn totals_take_last_result_record() {
        let mut totals = StreamTotals::new();
        totals.ingest(r#"{"type":"assistant","message":"irrelevant"}"#);
        totals.ingest(
            r#"{"type":"result","result":"ok","usage":{"input_tokens":10,"output_tokens":20}}"#,
        );
        assert!(totals.saw_result());
        assert_eq!(totals.response(), "ok");
        assert_eq!(totals.input_tokens, 10);
        assert_eq!(totals.output_tokens, 20);

        totals.ingest(
            r#"{"type":"result","result":"final","usage":{"input_tokens":30,"output_tokens":5}}"#,
        );
        assert_eq!(totals.response(), "final");
        assert_eq!(totals.input_tokens, 30);
        assert_eq!(totals.output_tokens, 5);
    }

    #[test]
    fn result_without_text_defaults() {
        let mut totals = StreamTotals::new();
        totals.ingest(r#"{"type":"result","usage":{"input_tokens":1,"output_tokens":2}}"#);
        assert_eq!(totals.response(), "Task completed");
    }
}
