//! Content descriptions from sampled frames.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::AiError;
use crate::gemini::{GeminiClient, Part};

/// Most frames sent per description request.
pub const MAX_FRAMES: usize = 3;

/// Instruction sent with every description request.
pub const DESCRIBE_PROMPT: &str = "These frames are sampled from one short video clip of a hospitality \
property. Describe what the clip shows in one or two factual sentences: the space (pool, room, \
restaurant, spa, lobby, exterior, view, beach, gym, bar), notable objects, lighting and time of day. \
Do not speculate and do not mention that these are frames.";

/// Something that turns frames into a short factual description.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn describe(&self, frames: &[PathBuf]) -> Result<String, AiError>;
}

/// Gemini-backed describer sending frames as base64 inline data.
pub struct GeminiVision {
    client: Arc<GeminiClient>,
}

impl GeminiVision {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VisionAnalyzer for GeminiVision {
    async fn describe(&self, frames: &[PathBuf]) -> Result<String, AiError> {
        let mut parts = Vec::with_capacity(MAX_FRAMES + 1);
        for frame in frames.iter().take(MAX_FRAMES) {
            let bytes = tokio::fs::read(frame)
                .await
                .map_err(|e| AiError::failed(format!("Failed to read frame {}: {}", frame.display(), e)))?;
            parts.push(Part::jpeg(STANDARD.encode(bytes)));
        }
        if parts.is_empty() {
            return Err(AiError::failed("no frames to describe"));
        }
        parts.push(Part::text(DESCRIBE_PROMPT));

        let text = self.client.generate(&parts, false).await?;
        Ok(text.trim().to_string())
    }
}
