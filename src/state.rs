use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::db::database::Database;
use crate::llm::{
    DalleBackend, ImageBackend, NanoBananaBackend, OpenAiClient, StableDiffusionBackend,
    VisionModel,
};
use crate::outfit::analyzer::ClothingAnalyzer;
use crate::outfit::cost::CostAccountant;
use crate::outfit::render::ImageOrchestrator;
use crate::outfit::SuggestionPipeline;

/// Everything a request needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub pipeline: Arc<SuggestionPipeline>,
}

impl AppState {
    pub async fn init(config: Arc<Config>) -> Result<Self> {
        let db = Database::init(&config.database_url).await?;
        let pipeline = Arc::new(build_pipeline(Arc::clone(&config))?);
        Ok(AppState {
            config,
            db,
            pipeline,
        })
    }
}

/// Wires the live services. Backends without credentials are still
/// registered; their attempts fail and fall back to the primary.
pub fn build_pipeline(config: Arc<Config>) -> Result<SuggestionPipeline> {
    let vision: Arc<dyn VisionModel> = Arc::new(OpenAiClient::new(&config)?);
    let backends: Vec<Arc<dyn ImageBackend>> = vec![
        Arc::new(DalleBackend::new(&config)?),
        Arc::new(StableDiffusionBackend::new(&config)?),
        Arc::new(NanoBananaBackend::new(&config)?),
    ];
    info!(
        "Image backends: dalle3=on stable-diffusion={} nano-banana={} default={}",
        if config.has_replicate() { "on" } else { "off" },
        if config.has_nano_banana() { "on" } else { "off" },
        config.default_image_backend
    );

    let analyzer = Arc::new(ClothingAnalyzer::new(Arc::clone(&vision), &config));
    let orchestrator = ImageOrchestrator::new(
        backends,
        analyzer,
        CostAccountant::new(config.pricing.clone()),
        config.clothing_detail_budget,
        config.reference_detail_budget,
    );
    Ok(SuggestionPipeline::new(config, vision, orchestrator))
}
