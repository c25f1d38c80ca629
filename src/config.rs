use std::env;

use anyhow::{anyhow, Result};
use tracing::warn;
use url::Url;

/// Rates used by the cost accountant, all in USD.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    pub text_input_per_million: f64,
    pub text_output_per_million: f64,
    pub vision_image_surcharge: f64,
    pub dalle_standard: f64,
    pub dalle_hd: f64,
    pub stable_diffusion: f64,
    pub nano_banana: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            text_input_per_million: 2.50,
            text_output_per_million: 10.00,
            vision_image_surcharge: 0.01,
            dalle_standard: 0.04,
            dalle_hd: 0.08,
            stable_diffusion: 0.0023,
            nano_banana: 0.001,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub logs_dir: String,
    pub database_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub chat_max_tokens: u32,
    pub chat_temperature: f32,
    pub analysis_max_tokens: u32,
    pub analysis_temperature: f32,
    pub dalle_model: String,
    pub dalle_size: String,
    pub dalle_quality: String,
    pub replicate_api_token: String,
    pub replicate_base_url: String,
    pub stable_diffusion_version: String,
    pub nano_banana_api_key: String,
    pub nano_banana_endpoint: String,
    pub default_image_backend: String,
    pub image_similarity_threshold: u32,
    pub clothing_detail_budget: usize,
    pub reference_detail_budget: usize,
    pub max_image_size_mb: usize,
    pub max_image_dimension: u32,
    pub http_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub pricing: PricingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            logs_dir: "logs".to_string(),
            database_url: "sqlite://outfit_suggestor.db?mode=rwc".to_string(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o".to_string(),
            chat_max_tokens: 1000,
            chat_temperature: 0.7,
            analysis_max_tokens: 1500,
            analysis_temperature: 0.1,
            dalle_model: "dall-e-3".to_string(),
            dalle_size: "1024x1792".to_string(),
            dalle_quality: "standard".to_string(),
            replicate_api_token: String::new(),
            replicate_base_url: "https://api.replicate.com/v1".to_string(),
            stable_diffusion_version:
                "39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b".to_string(),
            nano_banana_api_key: String::new(),
            nano_banana_endpoint: "https://api.nanobnana.com/v1/generate".to_string(),
            default_image_backend: "dalle3".to_string(),
            image_similarity_threshold: 5,
            clothing_detail_budget: 1200,
            reference_detail_budget: 800,
            max_image_size_mb: 20,
            max_image_dimension: 1024,
            http_timeout_secs: 60,
            generation_timeout_secs: 120,
            pricing: PricingConfig::default(),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

pub(crate) fn normalize_database_url(value: String) -> String {
    let trimmed = value.trim();
    if let Some(rest) = trimmed.strip_prefix("sqlite+") {
        if let Some(index) = rest.find("://") {
            return format!("sqlite{}", &rest[index..]);
        }
    }
    trimmed.to_string()
}

fn validated_url(name: &str, value: String) -> Result<String> {
    let trimmed = value.trim().trim_end_matches('/').to_string();
    Url::parse(&trimmed).map_err(|err| anyhow!("{name} is not a valid URL ({trimmed}): {err}"))?;
    Ok(trimmed)
}

fn normalize_dalle_quality(value: String) -> String {
    let lowered = value.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "standard" | "hd" => lowered,
        _ => {
            warn!("Unknown DALLE_QUALITY value '{}'; defaulting to standard.", value);
            "standard".to_string()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Config::default();

        let openai_api_key = env_string("OPENAI_API_KEY", "");
        if openai_api_key.trim().is_empty() {
            return Err(anyhow!("OPENAI_API_KEY is required"));
        }

        let pricing = PricingConfig {
            text_input_per_million: env_f64(
                "PRICE_TEXT_INPUT_PER_MILLION",
                defaults.pricing.text_input_per_million,
            ),
            text_output_per_million: env_f64(
                "PRICE_TEXT_OUTPUT_PER_MILLION",
                defaults.pricing.text_output_per_million,
            ),
            vision_image_surcharge: env_f64(
                "PRICE_VISION_IMAGE",
                defaults.pricing.vision_image_surcharge,
            ),
            dalle_standard: env_f64("PRICE_DALLE_STANDARD", defaults.pricing.dalle_standard),
            dalle_hd: env_f64("PRICE_DALLE_HD", defaults.pricing.dalle_hd),
            stable_diffusion: env_f64(
                "PRICE_STABLE_DIFFUSION",
                defaults.pricing.stable_diffusion,
            ),
            nano_banana: env_f64("PRICE_NANO_BANANA", defaults.pricing.nano_banana),
        };

        let debug_logging = env_bool("DEBUG", false);
        let log_level = if debug_logging {
            "debug".to_string()
        } else {
            env_string("LOG_LEVEL", &defaults.log_level).to_lowercase()
        };

        Ok(Config {
            log_level,
            logs_dir: env_string("LOGS_DIR", &defaults.logs_dir),
            database_url: normalize_database_url(env_string(
                "DATABASE_URL",
                &defaults.database_url,
            )),
            openai_api_key,
            openai_base_url: validated_url(
                "OPENAI_BASE_URL",
                env_string("OPENAI_BASE_URL", &defaults.openai_base_url),
            )?,
            chat_model: env_string("CHATGPT_MODEL", &defaults.chat_model),
            chat_max_tokens: env_u32("CHAT_MAX_TOKENS", defaults.chat_max_tokens),
            chat_temperature: env_f32("CHAT_TEMPERATURE", defaults.chat_temperature),
            analysis_max_tokens: env_u32("ANALYSIS_MAX_TOKENS", defaults.analysis_max_tokens),
            analysis_temperature: env_f32("ANALYSIS_TEMPERATURE", defaults.analysis_temperature),
            dalle_model: env_string("DALLE_MODEL", &defaults.dalle_model),
            dalle_size: env_string("DALLE_SIZE", &defaults.dalle_size),
            dalle_quality: normalize_dalle_quality(env_string(
                "DALLE_QUALITY",
                &defaults.dalle_quality,
            )),
            replicate_api_token: env_string("REPLICATE_API_TOKEN", ""),
            replicate_base_url: validated_url(
                "REPLICATE_BASE_URL",
                env_string("REPLICATE_BASE_URL", &defaults.replicate_base_url),
            )?,
            stable_diffusion_version: env_string(
                "STABLE_DIFFUSION_VERSION",
                &defaults.stable_diffusion_version,
            ),
            nano_banana_api_key: env_string("NANO_BANANA_API_KEY", ""),
            nano_banana_endpoint: validated_url(
                "NANO_BANANA_ENDPOINT",
                env_string("NANO_BANANA_ENDPOINT", &defaults.nano_banana_endpoint),
            )?,
            default_image_backend: env_string(
                "DEFAULT_IMAGE_BACKEND",
                &defaults.default_image_backend,
            )
            .to_lowercase(),
            image_similarity_threshold: env_u32(
                "IMAGE_SIMILARITY_THRESHOLD",
                defaults.image_similarity_threshold,
            ),
            clothing_detail_budget: env_usize(
                "CLOTHING_DETAIL_BUDGET",
                defaults.clothing_detail_budget,
            ),
            reference_detail_budget: env_usize(
                "REFERENCE_DETAIL_BUDGET",
                defaults.reference_detail_budget,
            ),
            max_image_size_mb: env_usize("MAX_IMAGE_SIZE_MB", defaults.max_image_size_mb).max(1),
            max_image_dimension: env_u32("MAX_IMAGE_DIMENSION", defaults.max_image_dimension)
                .max(64),
            http_timeout_secs: env_u64("HTTP_TIMEOUT_SECONDS", defaults.http_timeout_secs),
            generation_timeout_secs: env_u64(
                "GENERATION_TIMEOUT_SECONDS",
                defaults.generation_timeout_secs,
            ),
            pricing,
        })
    }

    pub fn has_replicate(&self) -> bool {
        !self.replicate_api_token.trim().is_empty()
    }

    pub fn has_nano_banana(&self) -> bool {
        !self.nano_banana_api_key.trim().is_empty()
    }
}
