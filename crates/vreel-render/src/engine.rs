//! Client for the external first-stage render engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::compiler::RenderJobSpec;
use crate::error::{RenderError, RenderResult};

/// Something that accepts compiled render jobs.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Submit a job spec; returns the engine's external job id.
    async fn submit(&self, spec: &RenderJobSpec) -> RenderResult<String>;
}

/// Render engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Submission endpoint
    pub url: String,
    /// Bearer key
    pub api_key: String,
    /// Request timeout
    pub timeout: Duration,
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> RenderResult<Self> {
        let url = std::env::var("RENDER_ENGINE_URL")
            .map_err(|_| RenderError::config_error("RENDER_ENGINE_URL not set"))?;
        let api_key = std::env::var("RENDER_ENGINE_API_KEY")
            .map_err(|_| RenderError::config_error("RENDER_ENGINE_API_KEY not set"))?;
        let timeout = std::env::var("RENDER_ENGINE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        Ok(Self {
            url,
            api_key,
            timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

/// HTTP JSON render engine client.
pub struct HttpRenderEngine {
    client: Client,
    config: EngineConfig,
}

impl HttpRenderEngine {
    pub fn new(config: EngineConfig) -> RenderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vreel-render/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> RenderResult<Self> {
        Self::new(EngineConfig::from_env()?)
    }
}

#[async_trait]
impl RenderEngine for HttpRenderEngine {
    async fn submit(&self, spec: &RenderJobSpec) -> RenderResult<String> {
        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(spec)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(
                render_job_id = %spec.metadata.render_job_id,
                status = status.as_u16(),
                "Render engine rejected job"
            );
            return Err(RenderError::EngineRejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| RenderError::engine_unavailable(format!("Malformed submit response: {}", e)))?;

        info!(
            render_job_id = %spec.metadata.render_job_id,
            external_id = %body.id,
            "Submitted render job"
        );
        Ok(body.id)
    }
}
