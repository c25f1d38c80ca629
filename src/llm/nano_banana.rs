use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::Config;
use crate::llm::media::{download_media, summarize_error_body};
use crate::llm::{ImageBackend, ImageGenerationError, RenderedImage};
use crate::outfit::types::BackendKind;
use crate::utils::http::build_http_client;
use crate::utils::timing::log_llm_timing;

const ASPECT_RATIO: &str = "9:16";

/// Nano Banana image API. Unlike the others it takes a reference photo.
pub struct NanoBananaBackend {
    client: Client,
    api_key: String,
    endpoint: String,
}

enum NanoBananaImage {
    Inline(Vec<u8>),
    Remote(String),
}

pub(crate) fn build_generate_payload(prompt: &str, reference: Option<&[u8]>) -> Value {
    let mut payload = json!({
        "prompt": prompt,
        "aspect_ratio": ASPECT_RATIO,
        "output_format": "png"
    });
    if let Some(reference) = reference.filter(|bytes| !bytes.is_empty()) {
        payload["reference_image"] = Value::String(general_purpose::STANDARD.encode(reference));
    }
    payload
}

fn extract_image(response: &Value) -> Result<NanoBananaImage> {
    if let Value::String(url) = response {
        return Ok(NanoBananaImage::Remote(url.clone()));
    }

    let url = response
        .get("image_url")
        .or_else(|| response.get("url"))
        .or_else(|| response.pointer("/data/url"))
        .and_then(|v| v.as_str())
        .filter(|url| !url.trim().is_empty());
    if let Some(url) = url {
        return Ok(NanoBananaImage::Remote(url.to_string()));
    }

    if let Some(encoded) = response.get("image_base64").and_then(|v| v.as_str()) {
        let bytes = general_purpose::STANDARD.decode(encoded.trim())?;
        return Ok(NanoBananaImage::Inline(bytes));
    }

    Err(anyhow!("Nano Banana returned no image URL or base64 payload"))
}

impl NanoBananaBackend {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(NanoBananaBackend {
            client: build_http_client(config.generation_timeout_secs)?,
            api_key: config.nano_banana_api_key.clone(),
            endpoint: config.nano_banana_endpoint.clone(),
        })
    }

    async fn call_api(&self, payload: &Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Nano Banana API error: status={}, body={}", status, body_summary);
            return Err(anyhow!(
                "Nano Banana request failed with status {}: {}",
                status,
                message.unwrap_or(body_summary)
            ));
        }

        Ok(response.json::<Value>().await?)
    }

    async fn generate(&self, prompt: &str, reference: Option<&[u8]>) -> Result<Vec<u8>> {
        let payload = build_generate_payload(prompt, reference);
        let metadata = json!({
            "prompt_chars": prompt.chars().count(),
            "has_reference": payload.get("reference_image").is_some(),
        });
        let response = log_llm_timing(
            "nano-banana",
            "nano-banana",
            "image_generation",
            Some(metadata),
            || self.call_api(&payload),
        )
        .await?;

        match extract_image(&response)? {
            NanoBananaImage::Inline(bytes) => Ok(bytes),
            NanoBananaImage::Remote(url) => download_media(&self.client, &url).await,
        }
    }
}

#[async_trait]
impl ImageBackend for NanoBananaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NanoBanana
    }

    async fn attempt(
        &self,
        prompt: &str,
        reference: Option<&[u8]>,
    ) -> Result<RenderedImage, ImageGenerationError> {
        if self.api_key.trim().is_empty() {
            return Err(ImageGenerationError::NotConfigured(self.kind()));
        }
        let bytes = self
            .generate(prompt, reference)
            .await
            .map_err(|err| ImageGenerationError::failed(self.kind(), err))?;
        Ok(RenderedImage {
            bytes,
            resolution: ASPECT_RATIO.to_string(),
            quality: "standard".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_image_is_base64_encoded() {
        let payload = build_generate_payload("prompt", Some(b"hello"));
        assert_eq!(payload["reference_image"], "aGVsbG8=");
        let payload = build_generate_payload("prompt", None);
        assert!(payload.get("reference_image").is_none());
    }

    #[test]
    fn extracts_urls_from_any_documented_field() {
        for response in [
            json!({ "image_url": "https://nb/a.png" }),
            json!({ "url": "https://nb/a.png" }),
            json!({ "data": { "url": "https://nb/a.png" } }),
            json!("https://nb/a.png"),
        ] {
            match extract_image(&response).unwrap() {
                NanoBananaImage::Remote(url) => assert_eq!(url, "https://nb/a.png"),
                NanoBananaImage::Inline(_) => panic!("expected url"),
            }
        }
    }

    #[test]
    fn falls_back_to_inline_base64() {
        match extract_image(&json!({ "image_base64": "aGVsbG8=" })).unwrap() {
            NanoBananaImage::Inline(bytes) => assert_eq!(bytes, b"hello"),
            NanoBananaImage::Remote(_) => panic!("expected inline"),
        }
        assert!(extract_image(&json!({ "status": "ok" })).is_err());
    }
}
