use thiserror::Error;
use uuid::Uuid;

/// Errors raised at the engine boundary. Per-query failures never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("run {run_id} belongs to domain '{found}', expected '{expected}'")]
    DomainMismatch {
        expected: String,
        found: String,
        run_id: Uuid,
    },

    #[error("at least 2 runs are required for a comparison, got {0}")]
    InsufficientRuns(usize),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error("cannot snapshot configuration: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error)]
#[error("cannot construct {component}: {reason}")]
pub struct ConstructionError {
    pub component: String,
    pub reason: String,
}

impl ConstructionError {
    pub fn new(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    Parse(String),

    #[error("index error: {0}")]
    Index(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Index(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge request failed: {0}")]
    Transport(String),

    #[error("judge returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot parse judge verdict: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
