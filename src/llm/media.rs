use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

/// Pulls a readable message out of an API error body.
pub fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("detail")
                    .or_else(|| value.get("message"))
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

pub fn data_url(bytes: &[u8]) -> String {
    let mime_type = detect_mime_type(bytes).unwrap_or_else(|| "image/jpeg".to_string());
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Fetches a generated asset. A single attempt; callers decide about fallbacks.
pub async fn download_media(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).send().await.map_err(|err| {
        warn!(
            "Failed to fetch media {url}: {err} (timeout={}, connect={})",
            err.is_timeout(),
            err.is_connect()
        );
        anyhow!("media download failed: {err}")
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(
            "Media download failed for {url} with status {}: {}",
            status,
            truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
        );
        return Err(anyhow!("media download failed with status {status}"));
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(anyhow!("media download returned an empty body"));
    }
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizes_openai_style_errors() {
        let (message, _) =
            summarize_error_body(r#"{"error": {"message": "Rate limit reached", "type": "x"}}"#);
        assert_eq!(message.as_deref(), Some("Rate limit reached"));

        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");

        let (message, _) = summarize_error_body(r#"{"detail": "Invalid version"}"#);
        assert_eq!(message.as_deref(), Some("Invalid version"));
    }

    #[test]
    fn truncates_long_log_values() {
        let value = "a".repeat(20);
        assert_eq!(truncate_for_log(&value, 5), "aaaaa... (truncated)");
        assert_eq!(truncate_for_log("short", 10), "short");
    }

    #[test]
    fn data_urls_carry_sniffed_mime_type() {
        let png_header = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];
        assert!(data_url(&png_header).starts_with("data:image/png;base64,"));
        assert!(data_url(b"???").starts_with("data:image/jpeg;base64,"));
    }
}
