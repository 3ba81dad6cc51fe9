//! Render error types.

use thiserror::Error;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Render engine rejected the job ({status}): {message}")]
    EngineRejected { status: u16, message: String },

    #[error("Render engine unreachable: {0}")]
    EngineUnavailable(String),

    #[error("Render job not found: {0}")]
    JobNotFound(String),

    #[error("Callback for job {job_id} names video {got}, but the job renders {expected}")]
    VideoMismatch {
        job_id: String,
        expected: String,
        got: String,
    },

    #[error("Render job {0} kept changing underneath us")]
    ConcurrentUpdate(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Firestore error: {0}")]
    Firestore(#[from] vreel_firestore::FirestoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vreel_queue::QueueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    pub fn engine_unavailable(msg: impl Into<String>) -> Self {
        Self::EngineUnavailable(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound(_))
    }

    /// A callback that contradicts the job it names.
    pub fn is_rejected_callback(&self) -> bool {
        matches!(self, Self::VideoMismatch { .. })
    }

    /// Persistence failures the caller should surface so the sender retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Firestore(e) => e.is_retryable() || e.is_precondition_failed(),
            Self::ConcurrentUpdate(_) | Self::EngineUnavailable(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RenderError {
    fn from(e: reqwest::Error) -> Self {
        Self::EngineUnavailable(e.to_string())
    }
}
