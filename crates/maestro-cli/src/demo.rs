//! Local demo workers and workflow definition files.

use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use maestro_orchestrator::{Metadata, Task, TaskExecutor, WorkflowStep};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

/// Worker types started by `maestro run` and `maestro workflow`, with the
/// capabilities each one advertises.
pub const ROSTER: &[(&str, &[&str])] = &[
    ("coder", &["code", "coding", "implementation"]),
    ("researcher", &["research"]),
    ("analyst", &["analysis", "data"]),
    ("writer", &["writing", "documentation"]),
    ("reviewer", &["review"]),
    ("tester", &["testing"]),
    ("planner", &["planning"]),
];

/// Stand-in executor: echoes the task back, tagged with the worker type.
pub struct RoleExecutor {
    worker_type: String,
    delay: Duration,
}

impl RoleExecutor {
    pub fn new(worker_type: impl Into<String>, delay: Duration) -> Self {
        Self {
            worker_type: worker_type.into(),
            delay,
        }
    }
}

#[async_trait]
impl TaskExecutor for RoleExecutor {
    async fn execute(&self, task: &Task) -> MaestroResult<Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut output = serde_json::Map::new();
        output.insert(self.worker_type.clone(), json!(task.description));
        output.insert("task_type".to_string(), json!(task.task_type));
        Ok(Value::Object(output))
    }
}

/// A workflow as written in a TOML file.
#[derive(Debug, Deserialize)]
pub struct WorkflowFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Initial context handed to the first step.
    #[serde(default)]
    pub context: Metadata,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowFile {
    pub fn load(path: &Path) -> MaestroResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MaestroError::Config(format!(
                "Failed to read workflow '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            MaestroError::Config(format!(
                "Failed to parse workflow '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

/// Turn `key=value` pairs into run context. Values that parse as JSON keep
/// their type, anything else is a string.
pub fn parse_context(pairs: &[String]) -> MaestroResult<Metadata> {
    let mut context = Metadata::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(MaestroError::Validation(format!(
                "context entry '{pair}' is not key=value"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(MaestroError::Validation(format!(
                "context entry '{pair}' has an empty key"
            )));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        context.insert(key.to_string(), value);
    }
    Ok(context)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_context_types() {
        let context = parse_context(&[
            "priority=critical".to_string(),
            "required_capabilities=[\"code\"]".to_string(),
            "retries=3".to_string(),
        ])
        .unwrap();
        assert_eq!(context["priority"], json!("critical"));
        assert_eq!(context["required_capabilities"], json!(["code"]));
        assert_eq!(context["retries"], json!(3));
    }

    #[test]
    fn test_parse_context_rejects_malformed() {
        assert!(parse_context(&["nokey".to_string()]).is_err());
        assert!(parse_context(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_load_workflow_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp.as_file_mut(),
            r#"
name = "release"

[context]
project = "maestro"

[[steps]]
id = "research"
agent_type = "research"
task = "Survey the changelog"

[[steps]]
id = "write"
agent_type = "writing"
task = "Draft the release notes"
depends_on = ["research"]
context_mapping = {{ notes = "research" }}
"#
        )
        .unwrap();

        let file = WorkflowFile::load(tmp.path()).unwrap();
        assert_eq!(file.name, "release");
        assert!(file.description.is_empty());
        assert_eq!(file.context["project"], json!("maestro"));
        assert_eq!(file.steps.len(), 2);
        assert_eq!(file.steps[1].depends_on, vec!["research".to_string()]);
        assert_eq!(file.steps[1].context_mapping["notes"], "research");
    }

    #[test]
    fn test_load_missing_workflow_file() {
        let err = WorkflowFile::load(Path::new("/nonexistent/workflow.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read workflow"));
    }

    #[tokio::test]
    async fn test_role_executor_tags_output() {
        let executor = RoleExecutor::new("coder", Duration::ZERO);
        let task = Task::new("Write the parser", "code");
        let value = executor.execute(&task).await.unwrap();
        assert_eq!(value["coder"], json!("Write the parser"));
        assert_eq!(value["task_type"], json!("code"));
    }
}
