use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::{download_media, summarize_error_body};
use crate::llm::{ImageBackend, ImageGenerationError, RenderedImage};
use crate::outfit::types::BackendKind;
use crate::utils::http::build_http_client;
use crate::utils::timing::log_llm_timing;

const ASPECT_RATIO: &str = "9:16";

/// Stable Diffusion XL through Replicate's synchronous prediction API.
pub struct StableDiffusionBackend {
    client: Client,
    api_token: String,
    base_url: String,
    version: String,
}

pub(crate) fn build_prediction_payload(version: &str, prompt: &str) -> Value {
    json!({
        "version": version,
        "input": {
            "prompt": prompt,
            "num_outputs": 1,
            "aspect_ratio": ASPECT_RATIO,
            "output_format": "png"
        }
    })
}

/// First output URL of a finished prediction.
pub(crate) fn extract_output_url(prediction: &Value) -> Result<String> {
    let status = prediction
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    if let Some(error) = prediction.get("error").and_then(|v| v.as_str()) {
        return Err(anyhow!("prediction {status}: {error}"));
    }

    let output = prediction.get("output");
    let url = match output {
        Some(Value::String(url)) => Some(url.clone()),
        Some(Value::Array(items)) => items
            .iter()
            .find_map(|item| item.as_str().map(|url| url.to_string())),
        _ => None,
    };

    url.filter(|url| !url.trim().is_empty())
        .ok_or_else(|| anyhow!("prediction returned no output (status={status})"))
}

impl StableDiffusionBackend {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(StableDiffusionBackend {
            client: build_http_client(config.generation_timeout_secs)?,
            api_token: config.replicate_api_token.clone(),
            base_url: config.replicate_base_url.trim_end_matches('/').to_string(),
            version: config.stable_diffusion_version.clone(),
        })
    }

    async fn create_prediction(&self, prompt: &str) -> Result<Value> {
        let payload = build_prediction_payload(&self.version, prompt);
        debug!(
            "Replicate request: version={}, prompt_chars={}",
            self.version,
            prompt.chars().count()
        );

        let response = self
            .client
            .post(format!("{}/predictions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Prefer", "wait")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Replicate API error: status={}, body={}", status, body_summary);
            return Err(anyhow!(
                "Replicate request failed with status {}: {}",
                status,
                message.unwrap_or(body_summary)
            ));
        }

        Ok(response.json::<Value>().await?)
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let metadata = json!({ "aspect_ratio": ASPECT_RATIO });
        let prediction = log_llm_timing(
            "replicate",
            "sdxl",
            "image_generation",
            Some(metadata),
            || self.create_prediction(prompt),
        )
        .await?;
        let url = extract_output_url(&prediction)?;
        download_media(&self.client, &url).await
    }
}

#[async_trait]
impl ImageBackend for StableDiffusionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::StableDiffusion
    }

    async fn attempt(
        &self,
        prompt: &str,
        _reference: Option<&[u8]>,
    ) -> Result<RenderedImage, ImageGenerationError> {
        if self.api_token.trim().is_empty() {
            return Err(ImageGenerationError::NotConfigured(self.kind()));
        }
        let bytes = self
            .generate(prompt)
            .await
            .map_err(|err| ImageGenerationError::failed(self.kind(), err))?;
        Ok(RenderedImage {
            bytes,
            resolution: ASPECT_RATIO.to_string(),
            quality: "standard".to_string(),
        })
    }
}
