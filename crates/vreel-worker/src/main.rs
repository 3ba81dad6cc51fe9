//! Footage pipeline worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vreel_firestore::{AssetRepository, FirestoreClient, RenderJobRepository, VideoRepository};
use vreel_queue::JobQueue;
use vreel_render::{CompilerConfig, HttpRenderEngine, RenderCompiler, RenderOrchestrator};
use vreel_storage::R2Client;
use vreel_worker::gemini::GeminiClient;
use vreel_worker::{
    FfmpegCompositor, FfmpegFrames, Generator, GeminiVision, Ingestor, JobExecutor, MatchEngine,
    OverlayStage, PipelineContext, ScriptBuilder, Sweeper, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vreel=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vreel-worker");

    if let Err(e) = run().await {
        error!("Worker failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Ok(port) = std::env::var("METRICS_PORT") {
        let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Prometheus metrics listening on {}", addr);
    }

    if let Err(e) = vreel_media::check_ffmpeg() {
        warn!("ffmpeg check failed, ingestion and overlays will fail: {}", e);
    }

    let storage = Arc::new(R2Client::from_env().await?);
    if let Err(e) = storage.check_connectivity().await {
        warn!("R2 bucket unreachable at startup: {}", e);
    }
    let firestore = FirestoreClient::from_env().await?;
    let assets = Arc::new(AssetRepository::new(firestore.clone()));
    let jobs = Arc::new(RenderJobRepository::new(firestore.clone()));
    let videos = Arc::new(VideoRepository::new(firestore));
    let queue = Arc::new(JobQueue::from_env()?);
    match (queue.len().await, queue.dlq_len().await) {
        (Ok(backlog), Ok(dead)) => info!(backlog, dead_letters = dead, "Queue reachable"),
        (Err(e), _) | (_, Err(e)) => warn!("Queue unreachable at startup: {}", e),
    }
    let gemini = Arc::new(GeminiClient::from_env()?);

    let orchestrator = Arc::new(RenderOrchestrator::new(
        jobs.clone(),
        videos.clone(),
        Arc::new(HttpRenderEngine::from_env()?),
        queue.clone(),
        RenderCompiler::new(CompilerConfig::from_env()),
    ));

    let ingestor = Ingestor::new(
        assets.clone(),
        storage.clone(),
        Arc::new(FfmpegFrames),
        Arc::new(GeminiVision::new(gemini.clone())),
        config.retry,
        &config.work_dir,
    )
    .with_frame_count(config.vision_frame_count);

    let generator = Generator::new(
        assets.clone(),
        videos,
        MatchEngine::for_mode(config.matching_mode, Some(gemini)),
        ScriptBuilder::new(storage.clone()),
        orchestrator.clone(),
    );

    let overlay_stage = OverlayStage::new(
        storage,
        Arc::new(FfmpegCompositor),
        &config.final_callback_url,
        &config.work_dir,
    )?;

    let sweeper = Sweeper::new(
        assets,
        jobs,
        orchestrator,
        queue.clone(),
        config.retry,
        config.sweep.clone(),
    );

    let executor = Arc::new(JobExecutor::new(
        config,
        queue,
        PipelineContext {
            ingestor,
            generator,
            overlay_stage,
        },
    ));

    let sweeper_shutdown = executor.subscribe();
    let sweeper_task = tokio::spawn(async move { sweeper.run(sweeper_shutdown).await });

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    executor.run().await?;
    sweeper_task.await.ok();
    Ok(())
}
