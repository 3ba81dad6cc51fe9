//! Worker configuration.

use std::time::Duration;

use vreel_models::RetryPolicy;

/// Which matching strategies run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchingMode {
    /// Deterministic scoring only
    #[default]
    Deterministic,
    /// AI matching first, deterministic scoring as the fallback
    Ai,
}

impl MatchingMode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "ai" | "gemini" => MatchingMode::Ai,
            _ => MatchingMode::Deterministic,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Work directory for temporary files
    pub work_dir: String,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Frames sampled per asset for the description call (2 or 3)
    pub vision_frame_count: usize,
    pub matching_mode: MatchingMode,
    /// Where the overlay stage posts its final callback
    pub final_callback_url: String,
    /// Retry limits shared by the vision loop and the sweeper
    pub retry: RetryPolicy,
    pub sweep: SweepConfig,
}

/// Retry sweeper settings.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Items pulled per kind per sweep
    pub batch_size: u32,
    /// How long a `pending_retry` asset rests before it is re-queued
    pub asset_retry_delay: Duration,
    /// `processing` assets older than this belong to a crashed worker
    pub asset_stuck_threshold: Duration,
    /// Render jobs without a callback for this long are failed
    pub render_stuck_threshold: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            batch_size: 25,
            asset_retry_delay: Duration::from_secs(300),
            asset_stuck_threshold: Duration::from_secs(1800),
            render_stuck_threshold: Duration::from_secs(1800),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            shutdown_timeout: Duration::from_secs(60),
            work_dir: "/tmp/vreel".to_string(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300), // 5 minutes
            vision_frame_count: 3,
            matching_mode: MatchingMode::Deterministic,
            final_callback_url: "http://localhost:8000/webhooks/final".to_string(),
            retry: RetryPolicy::default(),
            sweep: SweepConfig::default(),
        }
    }
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

impl SweepConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("SWEEP_ENABLED")
                .map(|v| !(v.eq_ignore_ascii_case("false") || v == "0"))
                .unwrap_or(true),
            interval: env_secs("SWEEP_INTERVAL_SECS", 60),
            batch_size: std::env::var("SWEEP_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(25),
            asset_retry_delay: env_secs("ASSET_RETRY_DELAY_SECS", 300),
            asset_stuck_threshold: env_secs("ASSET_STUCK_THRESHOLD_SECS", 1800),
            render_stuck_threshold: env_secs("RENDER_STUCK_THRESHOLD_SECS", 1800),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(4),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT", 60),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or_else(|_| "/tmp/vreel".to_string()),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS", 30),
            claim_min_idle: env_secs("WORKER_CLAIM_MIN_IDLE_SECS", 300),
            vision_frame_count: std::env::var("VISION_FRAME_COUNT")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(3)
                .clamp(2, 3),
            matching_mode: std::env::var("MATCHING_STRATEGY")
                .map(|s| MatchingMode::parse(&s))
                .unwrap_or_default(),
            final_callback_url: std::env::var("FINAL_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:8000/webhooks/final".to_string()),
            retry: RetryPolicy::from_env(),
            sweep: SweepConfig::from_env(),
        }
    }
}
