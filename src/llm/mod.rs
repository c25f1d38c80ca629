pub mod media;
pub mod nano_banana;
pub mod openai;
pub mod replicate;

use async_trait::async_trait;

use crate::outfit::cost::TokenUsage;
use crate::outfit::types::BackendKind;

pub use nano_banana::NanoBananaBackend;
pub use openai::{DalleBackend, OpenAiClient};
pub use replicate::StableDiffusionBackend;

#[derive(Debug, Clone)]
pub struct VisionParams {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Label used in timing logs.
    pub operation: &'static str,
}

#[derive(Debug, Clone)]
pub struct VisionReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// A vision-capable text generation service.
#[async_trait]
pub trait VisionModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn describe(
        &self,
        instruction: &str,
        image: &[u8],
        params: &VisionParams,
    ) -> anyhow::Result<VisionReply>;
}

#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub resolution: String,
    pub quality: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageGenerationError {
    #[error("{0} backend is not configured")]
    NotConfigured(BackendKind),
    #[error("Image generation failed on {backend}: {message}")]
    Failed {
        backend: BackendKind,
        message: String,
    },
}

impl ImageGenerationError {
    pub fn failed(backend: BackendKind, err: impl std::fmt::Display) -> Self {
        ImageGenerationError::Failed {
            backend,
            message: err.to_string(),
        }
    }
}

/// One text-to-image service. A single call per attempt; no retries.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn attempt(
        &self,
        prompt: &str,
        reference: Option<&[u8]>,
    ) -> Result<RenderedImage, ImageGenerationError>;
}
