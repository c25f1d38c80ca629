use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::{data_url, download_media, summarize_error_body, truncate_for_log};
use crate::llm::{
    ImageBackend, ImageGenerationError, RenderedImage, VisionModel, VisionParams, VisionReply,
};
use crate::outfit::cost::TokenUsage;
use crate::outfit::types::BackendKind;
use crate::utils::http::build_http_client;
use crate::utils::timing::log_llm_timing;

fn summarize_payload(payload: &Value) -> String {
    let model = payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let message_count = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| messages.len())
        .unwrap_or(0);
    let prompt_chars = payload
        .get("prompt")
        .and_then(|v| v.as_str())
        .map(|prompt| prompt.chars().count())
        .unwrap_or(0);
    format!("model={model}, messages={message_count}, prompt_chars={prompt_chars}")
}

async fn call_openai_api(
    client: &Client,
    url: &str,
    api_key: &str,
    payload: &Value,
) -> Result<Value> {
    debug!("OpenAI request: {}", summarize_payload(payload));

    let response = client
        .post(url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(payload)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (message, body_summary) = summarize_error_body(&body);
        warn!("OpenAI API error: status={}, body={}", status, body_summary);
        let detail = message.unwrap_or(body_summary);
        return Err(anyhow!(
            "OpenAI request failed with status {}: {}",
            status,
            detail
        ));
    }

    Ok(response.json::<Value>().await?)
}

pub(crate) fn build_vision_payload(
    model: &str,
    instruction: &str,
    image: &[u8],
    params: &VisionParams,
) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": instruction },
                { "type": "image_url", "image_url": { "url": data_url(image) } }
            ]
        }],
        "max_tokens": params.max_tokens,
        "temperature": params.temperature
    })
}

pub(crate) fn extract_chat_reply(response: &Value) -> Result<VisionReply> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| anyhow!("OpenAI response contained no choices"))?;
    let text = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let usage = TokenUsage::new(
        response
            .pointer("/usage/prompt_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        response
            .pointer("/usage/completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    );
    Ok(VisionReply { text, usage })
}

/// Chat completions client used for both suggestion and clothing analysis.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(OpenAiClient {
            client: build_http_client(config.http_timeout_secs)?,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.chat_model.clone(),
        })
    }
}

#[async_trait]
impl VisionModel for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn describe(
        &self,
        instruction: &str,
        image: &[u8],
        params: &VisionParams,
    ) -> Result<VisionReply> {
        let payload = build_vision_payload(&self.model, instruction, image, params);
        let url = format!("{}/chat/completions", self.base_url);
        let metadata = json!({
            "image_bytes": image.len(),
            "instruction_chars": instruction.chars().count(),
            "max_tokens": params.max_tokens,
        });

        let response = log_llm_timing(
            "openai",
            &self.model,
            params.operation,
            Some(metadata),
            || call_openai_api(&self.client, &url, &self.api_key, &payload),
        )
        .await?;

        let reply = extract_chat_reply(&response)?;
        debug!(
            "OpenAI {} reply ({} in / {} out tokens): {}",
            params.operation,
            reply.usage.input_tokens,
            reply.usage.output_tokens,
            truncate_for_log(&reply.text, 200)
        );
        Ok(reply)
    }
}

enum GeneratedImage {
    Inline(Vec<u8>),
    Remote(String),
}

fn extract_dalle_image(response: &Value) -> Result<GeneratedImage> {
    let first = response
        .pointer("/data/0")
        .ok_or_else(|| anyhow!("DALL-E response contained no images"))?;
    if let Some(encoded) = first.get("b64_json").and_then(|v| v.as_str()) {
        let bytes = general_purpose::STANDARD.decode(encoded.trim())?;
        return Ok(GeneratedImage::Inline(bytes));
    }
    if let Some(url) = first.get("url").and_then(|v| v.as_str()) {
        return Ok(GeneratedImage::Remote(url.to_string()));
    }
    Err(anyhow!("DALL-E response had neither b64_json nor url"))
}

/// DALL-E 3, the primary renderer. Text only: it never sees the upload.
pub struct DalleBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    size: String,
    quality: String,
}

impl DalleBackend {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(DalleBackend {
            client: build_http_client(config.generation_timeout_secs)?,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.dalle_model.clone(),
            size: config.dalle_size.clone(),
            quality: config.dalle_quality.clone(),
        })
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "size": self.size,
            "quality": self.quality,
            "n": 1,
            "response_format": "b64_json"
        });
        let url = format!("{}/images/generations", self.base_url);
        let metadata = json!({ "size": self.size, "quality": self.quality });

        let response = log_llm_timing(
            "openai",
            &self.model,
            "image_generation",
            Some(metadata),
            || call_openai_api(&self.client, &url, &self.api_key, &payload),
        )
        .await?;

        match extract_dalle_image(&response)? {
            GeneratedImage::Inline(bytes) => Ok(bytes),
            GeneratedImage::Remote(url) => download_media(&self.client, &url).await,
        }
    }
}

#[async_trait]
impl ImageBackend for DalleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dalle3
    }

    async fn attempt(
        &self,
        prompt: &str,
        _reference: Option<&[u8]>,
    ) -> Result<RenderedImage, ImageGenerationError> {
        if self.api_key.trim().is_empty() {
            return Err(ImageGenerationError::NotConfigured(self.kind()));
        }
        let bytes = self
            .generate(prompt)
            .await
            .map_err(|err| ImageGenerationError::failed(self.kind(), err))?;
        Ok(RenderedImage {
            bytes,
            resolution: self.size.clone(),
            quality: self.quality.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_payload_inlines_image_as_data_url() {
        let params = VisionParams {
            max_tokens: 1000,
            temperature: 0.7,
            operation: "outfit_suggestion",
        };
        let payload = build_vision_payload("gpt-4o", "style this", b"raw", &params);
        let content = payload.pointer("/messages/0/content").unwrap();
        assert_eq!(content[0]["text"], "style this");
        assert!(content[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:"));
        assert_eq!(payload["max_tokens"], 1000);
    }

    #[test]
    fn chat_reply_reads_text_and_usage() {
        let response = json!({
            "choices": [{ "message": { "content": "  {\"shirt\": \"white\"}  " } }],
            "usage": { "prompt_tokens": 812, "completion_tokens": 154 }
        });
        let reply = extract_chat_reply(&response).unwrap();
        assert_eq!(reply.text, "{\"shirt\": \"white\"}");
        assert_eq!(reply.usage, TokenUsage::new(812, 154));
        assert!(extract_chat_reply(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn dalle_image_prefers_inline_payload() {
        let response = json!({ "data": [{ "b64_json": "aGVsbG8=", "url": "https://x/y.png" }] });
        match extract_dalle_image(&response).unwrap() {
            GeneratedImage::Inline(bytes) => assert_eq!(bytes, b"hello"),
            GeneratedImage::Remote(_) => panic!("expected inline image"),
        }
        assert!(extract_dalle_image(&json!({ "data": [] })).is_err());
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let backend = DalleBackend::new(&Config::default()).unwrap();
        let result = backend.attempt("prompt", None).await;
        assert!(matches!(
            result,
            Err(ImageGenerationError::NotConfigured(BackendKind::Dalle3))
        ));
    }
}
