//! Structured job logging utilities.
//!
//! Every queue job gets the same start/progress/warning/error/completion
//! lines, tagged with the job id and the job kind.

use tracing::{error, info, warn, Span};

use vreel_queue::QueueJob;

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Logger for a queue job, using its kind as the operation.
    pub fn for_job(job: &QueueJob) -> Self {
        Self::new(&job.job_id(), job.kind())
    }

    pub fn new(job_id: &str, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span carrying the job id and operation, for instrumenting the job future.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vreel_models::AssetId;
    use vreel_queue::IngestAssetJob;

    #[test]
    fn test_logger_for_queue_job() {
        let job = QueueJob::IngestAsset(IngestAssetJob::new(AssetId::from("a1")));
        let logger = JobLogger::for_job(&job);
        assert_eq!(logger.job_id(), job.job_id());
        assert_eq!(logger.operation(), job.kind());
    }
}
