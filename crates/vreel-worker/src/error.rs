//! Worker error types.

use std::time::Duration;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Failure of a generative AI call (vision description or AI matching).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AiError {
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// Server-provided wait, when the payload carried one
        retry_after: Option<Duration>,
    },

    #[error("AI request failed: {0}")]
    Failed(String),

    #[error("AI response was empty")]
    EmptyResponse,
}

impl AiError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AiError::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Match strategy '{strategy}' failed: {message}")]
    StrategyFailed { strategy: String, message: String },

    #[error("Callback delivery failed: {0}")]
    CallbackFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    #[error("Storage error: {0}")]
    Storage(#[from] vreel_storage::StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] vreel_firestore::FirestoreError),

    #[error("Media error: {0}")]
    Media(#[from] vreel_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vreel_queue::QueueError),

    #[error("Render error: {0}")]
    Render(#[from] vreel_render::RenderError),

    #[error("Template error: {0}")]
    Template(#[from] vreel_models::TemplateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn strategy_failed(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StrategyFailed {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::DownloadFailed(_)
            | WorkerError::UploadFailed(_)
            | WorkerError::CallbackFailed(_)
            | WorkerError::Storage(_)
            | WorkerError::Queue(_)
            | WorkerError::Ai(_) => true,
            WorkerError::Firestore(e) => e.is_retryable(),
            WorkerError::Render(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Failures where redelivering the same message cannot help.
    pub fn is_permanent_failure(&self) -> bool {
        matches!(
            self,
            WorkerError::InvalidInput(_) | WorkerError::Template(_) | WorkerError::AssetNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(WorkerError::download_failed("reset").is_retryable());
        assert!(!WorkerError::invalid_input("bad").is_retryable());
        assert!(WorkerError::invalid_input("bad").is_permanent_failure());
        assert!(WorkerError::from(vreel_models::TemplateError::Empty).is_permanent_failure());
        assert!(AiError::RateLimited {
            message: "429".into(),
            retry_after: None
        }
        .is_rate_limited());
    }
}
