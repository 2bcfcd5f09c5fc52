//! Interfaces to the collaborators the coordinator depends on but does not
//! implement: request analysis, decomposition, result polling and task
//! execution. Rule-based [`KeywordPlanner`] and [`SentenceDecomposer`] let
//! the system run without a text-generation backend.

use crate::types::{Metadata, Task, TaskOutcome};
use async_trait::async_trait;
use maestro_core::{AgentId, MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Planner's estimate of how much work a request is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

/// Classification of a request produced by a [`Planner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestAnalysis {
    pub task_type: String,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub estimated_effort_minutes: f64,
    /// Ordering hints; any entry makes decomposed subtasks run as a chain.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Open-ended planner output carried through to the run report.
    #[serde(default)]
    pub extensions: Metadata,
}

impl RequestAnalysis {
    /// Classification used when the planner fails.
    pub fn neutral() -> Self {
        Self {
            task_type: "general".to_string(),
            complexity: Complexity::Medium,
            required_capabilities: Vec::new(),
            estimated_effort_minutes: 30.0,
            dependencies: Vec::new(),
            extensions: Metadata::new(),
        }
    }
}

impl Default for RequestAnalysis {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Classifies a free-text request.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn analyze(&self, request: &str) -> MaestroResult<RequestAnalysis>;
}

/// Splits a complex request into 2 to 5 subtask descriptions.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, request: &str, analysis: &RequestAnalysis)
        -> MaestroResult<Vec<String>>;
}

/// Where the coordinator looks for the outcome of an assigned task.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// `Ok(None)` while the worker has not reported yet.
    async fn poll(&self, worker: &AgentId, task_id: Uuid) -> MaestroResult<Option<TaskOutcome>>;

    /// The coordinator stopped tracking `task_id`; a result for it, now or
    /// later, will never be polled.
    async fn forget(&self, _task_id: Uuid) {}
}

/// The work a worker actually performs.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> MaestroResult<serde_json::Value>;
}

const TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "code",
        &["implement", "code", "function", "bug", "refactor", "compile", "program", "api"],
    ),
    (
        "research",
        &["research", "find", "investigate", "search", "compare", "look up"],
    ),
    (
        "analysis",
        &["analy", "data", "metric", "evaluate", "measure", "statistic"],
    ),
    ("writing", &["write", "document", "draft", "summar", "explain"]),
    ("review", &["review", "audit", "inspect"]),
    ("testing", &["test", "verify", "validate"]),
    ("planning", &["plan", "design", "roadmap", "architect"]),
];

const SEQUENCING_WORDS: &[&str] = &[" then ", " after ", " before ", " followed by "];

const BROAD_SCOPE_WORDS: &[&str] = &[
    "comprehensive",
    "end-to-end",
    "entire",
    "full system",
    "multiple",
    "complete",
];

/// Keyword-table planner: task type by most keyword hits, complexity by
/// length, sentence count and scope words.
#[derive(Debug, Default)]
pub struct KeywordPlanner;

impl KeywordPlanner {
    fn classify_type(lower: &str) -> &'static str {
        let mut best = ("general", 0usize);
        for (task_type, keywords) in TYPE_KEYWORDS {
            let hits = keywords.iter().filter(|k| lower.contains(*k)).count();
            if hits > best.1 {
                best = (*task_type, hits);
            }
        }
        best.0
    }

    fn classify_complexity(lower: &str) -> Complexity {
        let words = lower.split_whitespace().count();
        let sentences = split_sentences(lower).len();
        let broad = BROAD_SCOPE_WORDS.iter().any(|w| lower.contains(w));
        if broad || sentences >= 3 || words > 40 {
            Complexity::High
        } else if sentences <= 1 && words <= 12 {
            Complexity::Low
        } else {
            Complexity::Medium
        }
    }
}

#[async_trait]
impl Planner for KeywordPlanner {
    async fn analyze(&self, request: &str) -> MaestroResult<RequestAnalysis> {
        let lower = request.trim().to_lowercase();
        if lower.is_empty() {
            return Err(MaestroError::Planner("empty request".to_string()));
        }
        let task_type = Self::classify_type(&lower);
        let complexity = Self::classify_complexity(&lower);
        let required_capabilities = if task_type == "general" {
            Vec::new()
        } else {
            vec![task_type.to_string()]
        };
        let estimated_effort_minutes = match complexity {
            Complexity::Low => 10.0,
            Complexity::Medium => 30.0,
            Complexity::High => 90.0,
        };
        let dependencies = if SEQUENCING_WORDS.iter().any(|w| lower.contains(w)) {
            vec!["sequential".to_string()]
        } else {
            Vec::new()
        };
        Ok(RequestAnalysis {
            task_type: task_type.to_string(),
            complexity,
            required_capabilities,
            estimated_effort_minutes,
            dependencies,
            extensions: Metadata::new(),
        })
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    text.split(|c: char| matches!(c, '.' | ';' | '\n' | '!' | '?'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits on sentence boundaries and "then"; narrows to 2..=5 items.
#[derive(Debug, Default)]
pub struct SentenceDecomposer;

impl SentenceDecomposer {
    pub const MIN_SUBTASKS: usize = 2;
    pub const MAX_SUBTASKS: usize = 5;

    /// Join everything past the first `MAX_SUBTASKS - 1` parts into one last
    /// part, so no request text is dropped.
    pub fn fold_overflow(mut parts: Vec<String>) -> Vec<String> {
        if parts.len() > Self::MAX_SUBTASKS {
            let tail = parts.split_off(Self::MAX_SUBTASKS - 1).join("; ");
            parts.push(tail);
        }
        parts
    }
}

#[async_trait]
impl Decomposer for SentenceDecomposer {
    async fn decompose(
        &self,
        request: &str,
        analysis: &RequestAnalysis,
    ) -> MaestroResult<Vec<String>> {
        let request = request.trim();
        if request.is_empty() {
            return Err(MaestroError::Decomposer("empty request".to_string()));
        }

        let mut parts: Vec<String> = split_sentences(request)
            .into_iter()
            .flat_map(|s| {
                s.split(" then ")
                    .map(|p| {
                        let p = p.trim().trim_start_matches(',').trim();
                        p.strip_prefix("then ")
                            .or_else(|| p.strip_prefix("Then "))
                            .unwrap_or(p)
                            .trim()
                            .to_string()
                    })
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect();

        if parts.len() < Self::MIN_SUBTASKS {
            parts = vec![
                format!("Investigate the {} requirements: {request}", analysis.task_type),
                format!("Deliver the {} result: {request}", analysis.task_type),
            ];
        }
        Ok(Self::fold_overflow(parts))
    }
}
