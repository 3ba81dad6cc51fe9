//! Application state.

use std::sync::Arc;

use vreel_firestore::{FirestoreClient, RenderJobRepository, VideoRepository};
use vreel_queue::JobQueue;
use vreel_render::{CompilerConfig, HttpRenderEngine, RenderCompiler, RenderOrchestrator};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Arc<RenderOrchestrator>,
}

impl AppState {
    /// Create application state wired to Firestore, Redis and the render engine.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let firestore = FirestoreClient::from_env().await?;
        let jobs = Arc::new(RenderJobRepository::new(firestore.clone()));
        let videos = Arc::new(VideoRepository::new(firestore));

        let queue = Arc::new(JobQueue::from_env()?);
        queue.init().await?;

        let orchestrator = RenderOrchestrator::new(
            jobs,
            videos,
            Arc::new(HttpRenderEngine::from_env()?),
            queue,
            RenderCompiler::new(CompilerConfig::from_env()),
        );

        Ok(Self::with_orchestrator(config, Arc::new(orchestrator)))
    }

    pub fn with_orchestrator(config: ApiConfig, orchestrator: Arc<RenderOrchestrator>) -> Self {
        Self { config, orchestrator }
    }
}
