//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use vreel_queue::{JobQueue, QueueJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::generate::Generator;
use crate::ingest::Ingestor;
use crate::logging::JobLogger;
use crate::overlay_stage::OverlayStage;

/// Everything a job needs to run.
pub struct PipelineContext {
    pub ingestor: Ingestor,
    pub generator: Generator,
    pub overlay_stage: OverlayStage,
}

impl PipelineContext {
    /// Run one job to completion.
    pub async fn process(&self, job: &QueueJob) -> WorkerResult<()> {
        match job {
            QueueJob::IngestAsset(j) => {
                self.ingestor.ingest(&j.asset_id).await?;
            }
            QueueJob::GenerateVideo(j) => {
                self.generator.generate(j).await?;
            }
            QueueJob::ResubmitRender(j) => {
                self.generator.resubmit(j).await?;
            }
            QueueJob::BurnOverlays(j) => {
                self.overlay_stage.run(j).await?;
            }
        }
        Ok(())
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<PipelineContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: Arc<JobQueue>, ctx: PipelineContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue,
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Receiver that flips to `true` on shutdown, for companion tasks.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_jobs = self.config.max_concurrent_jobs,
            "Starting job executor"
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Reclaim messages left behind by crashed consumers
        let queue = Arc::clone(&self.queue);
        let consumer_name = self.consumer_name.clone();
        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let mut shutdown_rx_claim = self.shutdown.subscribe();
        let claim_interval = self.config.claim_interval;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue.claim_pending(&consumer_name, min_idle_ms, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!(count = jobs.len(), "Claimed pending jobs");
                                for (message_id, job) in jobs {
                                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                                        break;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    let queue = Arc::clone(&queue);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Failed to claim pending jobs"),
                        }
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!(error = %e, "Error consuming jobs");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "In-flight jobs still running at shutdown"
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!(count = jobs.len(), "Consumed jobs from queue");

        for (message_id, job) in jobs {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute a single job with retry and DLQ handling.
    async fn execute_job(ctx: Arc<PipelineContext>, queue: Arc<JobQueue>, message_id: String, job: QueueJob) {
        let span = JobLogger::for_job(&job).create_span();
        Self::run_job(ctx, queue, message_id, job).instrument(span).await
    }

    async fn run_job(ctx: Arc<PipelineContext>, queue: Arc<JobQueue>, message_id: String, job: QueueJob) {
        let logger = JobLogger::for_job(&job);
        logger.log_start("Executing job");

        let result = ctx.process(&job).await;
        metrics::counter!(
            "vreel_jobs_total",
            "kind" => job.kind(),
            "result" => if result.is_ok() { "ok" } else { "error" }
        )
        .increment(1);

        match result {
            Ok(()) => {
                logger.log_completion("Job completed");
                if let Err(e) = queue.ack(&message_id).await {
                    logger.log_error(&format!("Failed to ack: {}", e));
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    logger.log_warning(&format!("Failed to clear dedup key: {}", e));
                }
            }
            Err(e) => {
                logger.log_error(&format!("Job failed: {}", e));

                let max_retries = queue.max_retries();
                let exhausted = if e.is_permanent_failure() {
                    true
                } else {
                    let retry_count = queue.increment_retry(&message_id).await.unwrap_or(u32::MAX);
                    if retry_count < max_retries {
                        logger.log_progress(&format!(
                            "Will be retried (attempt {}/{})",
                            retry_count, max_retries
                        ));
                    }
                    retry_count >= max_retries
                };

                if exhausted {
                    logger.log_warning("Moving job to DLQ");
                    if let Err(dlq_err) = queue.dlq(&message_id, &job, &e.to_string()).await {
                        logger.log_error(&format!("Failed to move job to DLQ: {}", dlq_err));
                    }
                    if let Err(e) = queue.clear_dedup(&job).await {
                        logger.log_warning(&format!("Failed to clear dedup key: {}", e));
                    }
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
