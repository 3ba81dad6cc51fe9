//! Periodic retry sweeper.
//!
//! Re-queues footage that ended in `pending_retry` or was abandoned in
//! `processing`, and times out render jobs whose callbacks never arrived.
//! Every item is handled on its own; one failure never aborts a batch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use vreel_firestore::{AssetStore, RenderJobStore};
use vreel_models::{AssetStatus, FootageAsset, RenderJob, RetryPolicy};
use vreel_queue::{IngestAssetJob, JobPublisher, QueueJob, ResubmitRenderJob};
use vreel_render::RenderOrchestrator;

use crate::config::SweepConfig;
use crate::error::WorkerResult;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub requeued: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.scanned += other.scanned;
        self.requeued += other.requeued;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

pub struct Sweeper {
    assets: Arc<dyn AssetStore>,
    jobs: Arc<dyn RenderJobStore>,
    orchestrator: Arc<RenderOrchestrator>,
    publisher: Arc<dyn JobPublisher>,
    policy: RetryPolicy,
    config: SweepConfig,
}

fn ago(d: Duration) -> chrono::DateTime<Utc> {
    Utc::now() - chrono::Duration::seconds(d.as_secs().min(i64::MAX as u64) as i64)
}

impl Sweeper {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        jobs: Arc<dyn RenderJobStore>,
        orchestrator: Arc<RenderOrchestrator>,
        publisher: Arc<dyn JobPublisher>,
        policy: RetryPolicy,
        config: SweepConfig,
    ) -> Self {
        Self {
            assets,
            jobs,
            orchestrator,
            publisher,
            policy,
            config,
        }
    }

    /// One pass over both kinds.
    pub async fn sweep_once(&self) -> WorkerResult<SweepReport> {
        let mut report = self.sweep_assets().await?;
        report.merge(self.sweep_render_jobs().await?);

        for (outcome, count) in [
            ("requeued", report.requeued),
            ("failed", report.failed),
            ("skipped", report.skipped),
            ("error", report.errors),
        ] {
            metrics::counter!("vreel_sweep_items_total", "outcome" => outcome).increment(count as u64);
        }
        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                requeued = report.requeued,
                failed = report.failed,
                skipped = report.skipped,
                errors = report.errors,
                "Sweep finished"
            );
        }
        Ok(report)
    }

    async fn sweep_assets(&self) -> WorkerResult<SweepReport> {
        let batch = self.config.batch_size;
        let mut stale = self
            .assets
            .list_stale_assets(&[AssetStatus::PendingRetry], ago(self.config.asset_retry_delay), batch)
            .await?;
        stale.extend(
            self.assets
                .list_stale_assets(&[AssetStatus::Processing], ago(self.config.asset_stuck_threshold), batch)
                .await?,
        );

        let mut report = SweepReport::default();
        for asset in stale {
            report.scanned += 1;
            match self.requeue_asset(&asset).await {
                Ok(Some(())) => report.requeued += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    error!(asset_id = %asset.id, error = %e, "Failed to re-queue asset");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    async fn requeue_asset(&self, asset: &FootageAsset) -> WorkerResult<Option<()>> {
        if asset.retry_count >= self.policy.max_attempts {
            warn!(
                asset_id = %asset.id,
                retry_count = asset.retry_count,
                status = %asset.status,
                "Asset out of sweeper retries, leaving as is"
            );
            return Ok(None);
        }

        let retry_count = asset.retry_count + 1;
        match self
            .publisher
            .publish(QueueJob::IngestAsset(IngestAssetJob::requeue(asset.id.clone(), retry_count)))
            .await
        {
            Ok(message_id) => {
                debug!(asset_id = %asset.id, retry_count, message_id = %message_id, "Asset re-queued");
            }
            Err(e) if e.is_duplicate() => {
                debug!(asset_id = %asset.id, retry_count, "Re-queue already pending");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        self.assets.mark_requeued(&asset.id, retry_count).await?;
        Ok(Some(()))
    }

    async fn sweep_render_jobs(&self) -> WorkerResult<SweepReport> {
        let stale = self
            .jobs
            .list_stale_jobs(ago(self.config.render_stuck_threshold), self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for job in stale {
            report.scanned += 1;
            if let Err(e) = self.expire_job(&job, &mut report).await {
                error!(render_job_id = %job.id, error = %e, "Failed to expire render job");
                report.errors += 1;
            }
        }
        Ok(report)
    }

    async fn expire_job(&self, job: &RenderJob, report: &mut SweepReport) -> WorkerResult<()> {
        let outcome = self.orchestrator.fail_stuck(&job.id).await?;
        if !outcome.applied() {
            // a callback landed between the listing and the timeout
            report.skipped += 1;
            return Ok(());
        }
        report.failed += 1;

        if !self.orchestrator.owns_video(job).await? {
            debug!(render_job_id = %job.id, video_id = %job.video_id, "Superseded job, not resubmitting");
            report.skipped += 1;
            return Ok(());
        }

        if job.attempt >= self.policy.max_attempts {
            warn!(render_job_id = %job.id, attempt = job.attempt, "Render job out of attempts");
            return Ok(());
        }

        let resubmit = ResubmitRenderJob::new(job.id.clone(), job.attempt + 1);
        match self.publisher.publish(QueueJob::ResubmitRender(resubmit)).await {
            Ok(_) => {
                info!(render_job_id = %job.id, attempt = job.attempt + 1, "Render resubmission queued");
                report.requeued += 1;
            }
            Err(e) if e.is_duplicate() => report.skipped += 1,
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Sweep on a fixed interval until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("Retry sweeper disabled");
            return;
        }
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Retry sweeper started"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Retry sweeper stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeEngine, FakePublisher};
    use vreel_firestore::MemoryStore;
    use vreel_firestore::VideoStore;
    use vreel_models::{AssetId, CompositionScript, RenderJobId, RenderStatus, VideoId, VideoRecord};
    use vreel_render::{CompilerConfig, RenderCompiler};

    struct Harness {
        store: Arc<MemoryStore>,
        publisher: Arc<FakePublisher>,
        sweeper: Sweeper,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(FakePublisher::default());
        let orchestrator = Arc::new(RenderOrchestrator::new(
            store.clone(),
            store.clone(),
            Arc::new(FakeEngine::default()),
            publisher.clone(),
            RenderCompiler::new(CompilerConfig::default()),
        ));
        let sweeper = Sweeper::new(
            store.clone(),
            store.clone(),
            orchestrator,
            publisher.clone(),
            RetryPolicy::immediate(3),
            SweepConfig::default(),
        );
        Harness {
            store,
            publisher,
            sweeper,
        }
    }

    fn old() -> chrono::DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(2)
    }

    fn asset(store: &MemoryStore, id: &str, status: AssetStatus, retry_count: u32) {
        let mut a = FootageAsset::new(AssetId::from(id), "u", "p", "k").with_status(status);
        a.retry_count = retry_count;
        store.insert_asset(a);
        store.backdate_asset(&AssetId::from(id), old());
    }

    async fn stuck_job(store: &MemoryStore, attempt: u32) -> RenderJob {
        let script = CompositionScript {
            clips: Vec::new(),
            overlays: Vec::new(),
            total_duration: 3.0,
        };
        let mut job = RenderJob::new(VideoId::from("v"), "p", "u", script);
        job.attempt = attempt;
        store.create_job(&job).await.unwrap();
        store.backdate_job(&job.id, old());
        job
    }

    #[tokio::test]
    async fn test_assets_requeued_with_bumped_count() {
        let h = harness();
        asset(&h.store, "pending", AssetStatus::PendingRetry, 0);
        asset(&h.store, "crashed", AssetStatus::Processing, 1);
        asset(&h.store, "done", AssetStatus::Ready, 0);

        let report = h.sweeper.sweep_once().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.requeued, 2);
        assert_eq!(h.store.asset(&AssetId::from("pending")).unwrap().retry_count, 1);
        assert_eq!(h.store.asset(&AssetId::from("crashed")).unwrap().retry_count, 2);
        assert_eq!(h.publisher.kinds(), vec!["ingest_asset", "ingest_asset"]);
    }

    #[tokio::test]
    async fn test_exhausted_asset_skipped_not_errored() {
        let h = harness();
        asset(&h.store, "tired", AssetStatus::PendingRetry, 3);

        let report = h.sweeper.sweep_once().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(h.publisher.kinds().is_empty());
        assert_eq!(
            h.store.asset(&AssetId::from("tired")).unwrap().status,
            AssetStatus::PendingRetry
        );
    }

    #[tokio::test]
    async fn test_fresh_pending_asset_waits() {
        let h = harness();
        h.store.insert_asset(
            FootageAsset::new(AssetId::from("new"), "u", "p", "k").with_status(AssetStatus::PendingRetry),
        );
        let report = h.sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_stuck_render_failed_and_resubmitted() {
        let h = harness();
        let job = stuck_job(&h.store, 1).await;

        let report = h.sweeper.sweep_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.requeued, 1);

        let stored = h.store.job(&job.id).unwrap();
        assert_eq!(stored.status, RenderStatus::Failed);
        let published = h.publisher.published.lock().unwrap();
        match published.as_slice() {
            [QueueJob::ResubmitRender(r)] => {
                assert_eq!(r.previous_job_id, job.id);
                assert_eq!(r.attempt, 2);
            }
            other => panic!("unexpected jobs: {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_superseded_render_not_resubmitted() {
        let h = harness();
        let orphan = stuck_job(&h.store, 1).await;
        h.store
            .upsert_video(&VideoRecord::generating(
                orphan.video_id.clone(),
                "p",
                "u",
                RenderJobId::from("newer"),
            ))
            .await
            .unwrap();

        let report = h.sweeper.sweep_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.requeued, 0);
        assert!(h.publisher.kinds().is_empty());
        assert_eq!(
            h.store.video(&orphan.video_id).unwrap().render_job_id,
            Some(RenderJobId::from("newer"))
        );
    }

    #[tokio::test]
    async fn test_last_attempt_not_resubmitted() {
        let h = harness();
        stuck_job(&h.store, 3).await;

        let report = h.sweeper.sweep_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.requeued, 0);
        assert!(h.publisher.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_requeue_counts_as_skipped() {
        let h = harness();
        asset(&h.store, "pending", AssetStatus::PendingRetry, 0);
        h.publisher.reject_duplicates();

        let report = h.sweeper.sweep_once().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors, 0);
        assert_eq!(h.store.asset(&AssetId::from("pending")).unwrap().retry_count, 0);
    }
}
