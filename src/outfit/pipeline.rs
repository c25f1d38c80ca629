use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Degradation, StylistError};
use crate::llm::{VisionModel, VisionParams};
use crate::outfit::cost::{format_cost, CostAccountant, CostBreakdown};
use crate::outfit::duplicate::{DuplicateCandidate, DuplicateMatch, DuplicateQuery};
use crate::outfit::parser::parse_suggestion_with_report;
use crate::outfit::prompt::build_suggestion_prompt;
use crate::outfit::render::{GenerationRequest, ImageOrchestrator, RenderOutcome};
use crate::outfit::types::{
    group_by_category, BackendKind, ClothingCategory, HistoryEntry, OutfitSuggestion,
    OwnedItems, WardrobeItem, WardrobeMatches,
};
use crate::outfit::wardrobe;
use crate::utils::timing::{complete_request_timer, start_request_timer};
use crate::utils::upload::{prepare_for_vision, validate_upload};

/// Reads an owner's garment collection, most recently added first.
#[async_trait]
pub trait GarmentReader: Send + Sync {
    async fn garments(
        &self,
        owner_id: i64,
        category: Option<ClothingCategory>,
    ) -> anyhow::Result<Vec<WardrobeItem>>;

    async fn garment(&self, owner_id: i64, item_id: i64) -> anyhow::Result<Option<WardrobeItem>>;
}

/// Reads an owner's prior suggestions, most recent first.
#[async_trait]
pub trait SuggestionHistoryReader: Send + Sync {
    async fn recent_suggestions(
        &self,
        owner_id: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<HistoryEntry>>;
}

#[derive(Debug, Clone, Default)]
pub struct WardrobeConstraint {
    pub owned_items: Option<OwnedItems>,
    /// Suggest only from `owned_items`.
    pub owned_only: bool,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub backend: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SuggestionRequest {
    pub image: Vec<u8>,
    pub text_context: String,
    pub wardrobe: WardrobeConstraint,
    /// Render a model image after the text suggestion.
    pub render: Option<RenderOptions>,
    /// When present, owned garments are matched against the suggestion.
    pub garments: Option<Vec<WardrobeItem>>,
}

impl SuggestionRequest {
    pub fn new(image: Vec<u8>, text_context: impl Into<String>) -> Self {
        SuggestionRequest {
            image,
            text_context: text_context.into(),
            ..SuggestionRequest::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuggestionOutcome {
    pub suggestion: OutfitSuggestion,
    pub cost: CostBreakdown,
    pub image_backend: Option<BackendKind>,
    pub degradations: Vec<Degradation>,
}

pub struct SuggestionPipeline {
    config: Arc<Config>,
    vision: Arc<dyn VisionModel>,
    orchestrator: ImageOrchestrator,
    accountant: CostAccountant,
}

fn storage_error(err: anyhow::Error) -> StylistError {
    StylistError::Storage(err.to_string())
}

/// Drops rows a reader returned for somebody else.
fn keep_owned<T>(owner_id: i64, rows: Vec<T>, row_owner: impl Fn(&T) -> i64, what: &str) -> Vec<T> {
    let total = rows.len();
    let owned: Vec<T> = rows
        .into_iter()
        .filter(|row| row_owner(row) == owner_id)
        .collect();
    if owned.len() != total {
        error!(
            "Reader returned {} {what} not owned by {owner_id}; ignoring them",
            total - owned.len()
        );
    }
    owned
}

impl SuggestionPipeline {
    pub fn new(
        config: Arc<Config>,
        vision: Arc<dyn VisionModel>,
        orchestrator: ImageOrchestrator,
    ) -> Self {
        let accountant = CostAccountant::new(config.pricing.clone());
        SuggestionPipeline {
            config,
            vision,
            orchestrator,
            accountant,
        }
    }

    /// Photo plus context in, complete suggestion with cost out. Fails only on
    /// an invalid upload or when the suggestion call itself is unavailable.
    pub async fn build_suggestion(
        &self,
        request: SuggestionRequest,
    ) -> Result<SuggestionOutcome, StylistError> {
        let mut timer = start_request_timer(
            "build_suggestion",
            None,
            Some(request.text_context.as_str()),
        );

        if let Err(err) = validate_upload(&request.image, self.config.max_image_size_mb) {
            complete_request_timer(&mut timer, "invalid_request", Some(err.to_string()));
            return Err(err);
        }

        let mut degradations = Vec::new();
        let prepared = prepare_for_vision(&request.image, self.config.max_image_dimension);
        if !prepared.decoded {
            degradations.push(Degradation::UndecodableImage);
        }

        let prompt = build_suggestion_prompt(
            &request.text_context,
            request.wardrobe.owned_items.as_ref(),
            request.wardrobe.owned_only,
        );
        let params = VisionParams {
            max_tokens: self.config.chat_max_tokens,
            temperature: self.config.chat_temperature,
            operation: "outfit_suggestion",
        };

        let reply = match self.vision.describe(&prompt, &prepared.bytes, &params).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(
                    "Suggestion call to {} failed: {err}",
                    self.vision.model_name()
                );
                complete_request_timer(&mut timer, "upstream_unavailable", Some(err.to_string()));
                return Err(StylistError::UpstreamUnavailable(err.to_string()));
            }
        };

        let parsed = parse_suggestion_with_report(&reply.text);
        if !parsed.is_clean() {
            degradations.push(Degradation::MalformedUpstreamOutput);
        }
        let mut suggestion = parsed.suggestion;
        let mut usage = reply.usage;
        let mut image_cost = 0.0;
        let mut image_backend = None;

        if let Some(render) = request.render.as_ref() {
            let outcome = self
                .orchestrator
                .render(GenerationRequest {
                    suggestion: &suggestion,
                    original_image: Some(&request.image),
                    location: render.location.as_deref(),
                    backend: &render.backend,
                })
                .await;
            usage = usage + outcome.analysis_usage;
            image_cost = outcome.image_cost;
            image_backend = outcome.backend;
            degradations.extend(outcome.degradations);
            suggestion.model_image = outcome.image;
        }

        if let Some(garments) = request.garments.as_deref() {
            suggestion.matching_wardrobe_items = Some(wardrobe::match_wardrobe(&suggestion, garments));
        }

        let cost = self.accountant.breakdown(usage, true, image_cost);
        suggestion.cost = Some(cost.clone());

        for degradation in &degradations {
            warn!("Suggestion degraded: {}", degradation.as_str());
        }
        info!(
            "Suggestion built: text_cost={} image_cost={} total={} backend={:?}",
            format_cost(cost.text_cost()),
            format_cost(cost.image_cost()),
            format_cost(cost.total_cost()),
            image_backend
        );
        let status = if degradations.is_empty() { "success" } else { "degraded" };
        complete_request_timer(
            &mut timer,
            status,
            Some(
                degradations
                    .iter()
                    .map(|degradation| degradation.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        );

        Ok(SuggestionOutcome {
            suggestion,
            cost,
            image_backend,
            degradations,
        })
    }

    /// Renders a model wearing the outfit. Never fails; see `RenderOutcome`.
    pub async fn render_model_image(
        &self,
        suggestion: &OutfitSuggestion,
        original_image: Option<&[u8]>,
        location: Option<&str>,
        backend: &str,
    ) -> RenderOutcome {
        let mut timer = start_request_timer("render_model_image", None, location);
        let outcome = self
            .orchestrator
            .render(GenerationRequest {
                suggestion,
                original_image,
                location,
                backend,
            })
            .await;
        let status = if outcome.image.is_some() { "success" } else { "no_image" };
        complete_request_timer(
            &mut timer,
            status,
            Some(format!("attempts={:?}", outcome.attempts)),
        );
        outcome
    }

    /// Uses the configured threshold when none is given.
    pub fn find_duplicate<'a, C: DuplicateCandidate>(
        &self,
        image: &[u8],
        candidates: &'a [C],
        threshold: Option<u32>,
    ) -> Option<DuplicateMatch<'a, C>> {
        DuplicateQuery::new(image, candidates)
            .with_threshold(threshold.unwrap_or(self.config.image_similarity_threshold))
            .run()
    }

    pub fn match_wardrobe(
        &self,
        suggestion: &OutfitSuggestion,
        garments: &[WardrobeItem],
    ) -> WardrobeMatches {
        wardrobe::match_wardrobe(suggestion, garments)
    }

    /// Builds a suggestion using the owner's stored garments as context and
    /// matches the result against them.
    pub async fn suggest_for_owner(
        &self,
        reader: &dyn GarmentReader,
        owner_id: i64,
        mut request: SuggestionRequest,
    ) -> Result<SuggestionOutcome, StylistError> {
        let garments = reader
            .garments(owner_id, None)
            .await
            .map_err(storage_error)?;
        let garments = keep_owned(owner_id, garments, |item| item.owner_id, "garments");

        if request.wardrobe.owned_only && garments.is_empty() {
            warn!("Owner {owner_id} asked for owned items only but has no wardrobe");
        }
        if !garments.is_empty() {
            request.wardrobe.owned_items = Some(group_by_category(&garments));
        }
        request.garments = Some(garments);
        self.build_suggestion(request).await
    }

    /// Uses the stored photo of an owned item as the input image.
    pub async fn suggest_from_wardrobe_item(
        &self,
        reader: &dyn GarmentReader,
        owner_id: i64,
        item_id: i64,
        mut request: SuggestionRequest,
    ) -> Result<SuggestionOutcome, StylistError> {
        let item = reader
            .garment(owner_id, item_id)
            .await
            .map_err(storage_error)?
            .filter(|item| item.owner_id == owner_id)
            .ok_or_else(|| {
                StylistError::Validation(format!("wardrobe item {item_id} not found"))
            })?;
        let image = item.image.ok_or_else(|| {
            StylistError::Validation(format!("wardrobe item {item_id} has no image"))
        })?;
        if request.text_context.trim().is_empty() {
            request.text_context = format!("Build an outfit around my {}", item.name);
        }
        request.image = image;
        self.suggest_for_owner(reader, owner_id, request).await
    }

    /// Checks a new photo against the owner's recent suggestions.
    pub async fn check_duplicate(
        &self,
        reader: &dyn SuggestionHistoryReader,
        owner_id: i64,
        image: &[u8],
        limit: usize,
    ) -> Result<Option<HistoryEntry>, StylistError> {
        let entries = reader
            .recent_suggestions(owner_id, limit)
            .await
            .map_err(storage_error)?;
        let entries = keep_owned(owner_id, entries, |entry| entry.owner_id, "history entries");
        let found = self
            .find_duplicate(image, &entries, None)
            .map(|found| found.candidate.clone());
        if let Some(entry) = &found {
            info!("Upload from owner {owner_id} duplicates history entry {}", entry.id);
        }
        Ok(found)
    }

    /// Checks a new photo against the owner's stored garments.
    pub async fn check_wardrobe_duplicate(
        &self,
        reader: &dyn GarmentReader,
        owner_id: i64,
        image: &[u8],
        category: Option<ClothingCategory>,
    ) -> Result<Option<WardrobeItem>, StylistError> {
        let garments = reader
            .garments(owner_id, category)
            .await
            .map_err(storage_error)?;
        let garments = keep_owned(owner_id, garments, |item| item.owner_id, "garments");
        Ok(self
            .find_duplicate(image, &garments, None)
            .map(|found| found.candidate.clone()))
    }
}
