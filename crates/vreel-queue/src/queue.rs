//! Job queue using Redis Streams.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{GenerateVideoJob, IngestAssetJob, QueueJob};

/// How long an idempotency key blocks re-enqueueing.
pub const DEDUP_TTL_SECS: u64 = 3600;

/// How long a per-message retry counter lives.
const RETRY_COUNTER_TTL_SECS: i64 = 86400;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Max retries before DLQ
    pub max_retries: u32,
    /// Job visibility timeout
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vreel:jobs".to_string(),
            consumer_group: "vreel:workers".to_string(),
            dlq_stream_name: "vreel:dlq".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
        }
    }
}

/// Anything that can hand a job to the workers.
///
/// The orchestrator and the sweeper only need to publish, so they depend on
/// this rather than on [`JobQueue`].
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publish a job, returning its message id.
    async fn publish(&self, job: QueueJob) -> QueueResult<String>;
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

fn dedup_key(idempotency_key: &str) -> String {
    format!("vreel:dedup:{}", idempotency_key)
}

fn retry_key(message_id: &str) -> String {
    format!("vreel:retry:{}", message_id)
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue an ingestion job.
    pub async fn enqueue_ingest(&self, job: IngestAssetJob) -> QueueResult<String> {
        self.enqueue(QueueJob::IngestAsset(job)).await
    }

    /// Enqueue a video generation request.
    pub async fn enqueue_generate(&self, job: GenerateVideoJob) -> QueueResult<String> {
        self.enqueue(QueueJob::GenerateVideo(job)).await
    }

    /// Enqueue a job, rejecting duplicates within the dedup window.
    pub async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(&job)?;
        let idempotency_key = job.idempotency_key();
        let dedup = dedup_key(&idempotency_key);

        // SET NX claims the key atomically so two racing producers cannot both enqueue.
        let claimed: bool = redis::cmd("SET")
            .arg(&dedup)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !claimed {
            warn!(key = %idempotency_key, "Duplicate job rejected");
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await;

        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                // Release the claim so a later attempt is not rejected as a duplicate.
                conn.del::<_, ()>(&dedup).await.ok();
                return Err(QueueError::enqueue_failed(e.to_string()));
            }
        };

        info!(
            job_id = %job.job_id(),
            kind = job.kind(),
            message_id = %message_id,
            "Enqueued job"
        );

        Ok(message_id)
    }

    /// Drop a job's idempotency key so it can be enqueued again.
    pub async fn clear_dedup(&self, job: &QueueJob) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(dedup_key(&job.idempotency_key())).await?;
        Ok(())
    }

    /// Acknowledge a job (mark as completed).
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        conn.del::<_, ()>(retry_key(message_id)).await.ok();

        debug!(message_id = %message_id, "Acknowledged job");
        Ok(())
    }

    /// Move a job to the dead letter queue.
    pub async fn dlq(&self, message_id: &str, job: &QueueJob, error: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!(job_id = %job.job_id(), kind = job.kind(), "Moved job to DLQ: {}", error);
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Parse stream entries, acking payloads that cannot be decoded.
    async fn decode_entries(
        &self,
        entries: Vec<redis::streams::StreamId>,
    ) -> Vec<(String, QueueJob)> {
        let mut jobs = Vec::new();
        for entry in entries {
            let message_id = entry.id.clone();
            let Some(redis::Value::BulkString(payload)) = entry.map.get("job") else {
                warn!(message_id = %message_id, "Stream entry has no job payload");
                self.ack(&message_id).await.ok();
                continue;
            };
            match serde_json::from_slice::<QueueJob>(payload) {
                Ok(job) => jobs.push((message_id, job)),
                Err(e) => {
                    warn!(message_id = %message_id, "Failed to parse job payload: {}", e);
                    // Ack the malformed message to prevent reprocessing
                    self.ack(&message_id).await.ok();
                }
            }
        }
        jobs
    }

    /// Read new jobs for this consumer.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = result.keys.into_iter().flat_map(|k| k.ids).collect();
        let jobs = self.decode_entries(entries).await;
        for (message_id, job) in &jobs {
            debug!(message_id = %message_id, job_id = %job.job_id(), "Consumed job");
        }
        Ok(jobs)
    }

    /// Claim pending jobs that have been idle for too long (crashed workers).
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueueJob)>> {
        let mut conn = self.connection().await?;

        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut claim = redis::cmd("XCLAIM");
        claim
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms);
        for entry in &pending.ids {
            claim.arg(&entry.id);
        }
        let result: redis::streams::StreamClaimReply = claim.query_async(&mut conn).await?;

        let jobs = self.decode_entries(result.ids).await;
        for (message_id, job) in &jobs {
            info!(message_id = %message_id, job_id = %job.job_id(), "Claimed pending job");
        }
        Ok(jobs)
    }

    /// Increment retry count for a message.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.connection().await?;
        let key = retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, RETRY_COUNTER_TTL_SECS).await?;
        Ok(count)
    }

    /// Get max retries from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

#[async_trait]
impl JobPublisher for JobQueue {
    async fn publish(&self, job: QueueJob) -> QueueResult<String> {
        self.enqueue(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        std::env::remove_var("QUEUE_STREAM");
        std::env::remove_var("QUEUE_MAX_RETRIES");
        let config = QueueConfig::from_env();
        assert_eq!(config.stream_name, "vreel:jobs");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    #[serial]
    fn test_config_from_env_overrides() {
        std::env::set_var("QUEUE_MAX_RETRIES", "7");
        std::env::set_var("QUEUE_DLQ_STREAM", "custom:dlq");
        let config = QueueConfig::from_env();
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.dlq_stream_name, "custom:dlq");
        std::env::remove_var("QUEUE_MAX_RETRIES");
        std::env::remove_var("QUEUE_DLQ_STREAM");
    }

    #[test]
    fn test_key_namespaces() {
        assert_eq!(dedup_key("ingest:a1:0"), "vreel:dedup:ingest:a1:0");
        assert_eq!(retry_key("1-0"), "vreel:retry:1-0");
    }
}
