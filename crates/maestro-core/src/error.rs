use thiserror::Error;

/// A convenience `Result` alias using [`MaestroError`].
pub type MaestroResult<T> = Result<T, MaestroError>;

/// Top-level error type for the Maestro orchestration core.
///
/// Assignment and timeout failures (no eligible worker, a full mailbox, a
/// task past its deadline) are reported as data on the task and the run
/// report, never raised. This enum covers the cases that do cross an API
/// boundary as an error.
#[derive(Error, Debug)]
pub enum MaestroError {
    /// A malformed message, task or request.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request planner collaborator failed.
    #[error("Planner error: {0}")]
    Planner(String),

    /// The request decomposer collaborator failed.
    #[error("Decomposer error: {0}")]
    Decomposer(String),

    /// A worker reported a failure while executing a task.
    #[error("Worker error: {0}")]
    Worker(String),

    /// Workflow lookup or execution failure.
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Configuration parsing or validation failure.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
