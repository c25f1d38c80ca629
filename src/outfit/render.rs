use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Degradation;
use crate::llm::{ImageBackend, ImageGenerationError, RenderedImage};
use crate::outfit::analyzer::{ClothingAnalysis, ClothingAnalyzer};
use crate::outfit::cost::{CostAccountant, TokenUsage};
use crate::outfit::prompt::{build_model_image_prompt, model_description_for_location};
use crate::outfit::types::{BackendKind, OutfitSuggestion};

/// Request-scoped input for one render.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub suggestion: &'a OutfitSuggestion,
    pub original_image: Option<&'a [u8]>,
    pub location: Option<&'a str>,
    pub backend: &'a str,
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub image: Option<Vec<u8>>,
    pub image_cost: f64,
    /// Backend that produced the image.
    pub backend: Option<BackendKind>,
    /// Backends invoked, in order. Never more than two.
    pub attempts: Vec<BackendKind>,
    pub analysis_usage: TokenUsage,
    pub degradations: Vec<Degradation>,
}

enum RenderState {
    Attempt(BackendKind),
    Done(BackendKind, RenderedImage),
    Failed,
}

pub struct ImageOrchestrator {
    backends: Vec<Arc<dyn ImageBackend>>,
    analyzer: Arc<ClothingAnalyzer>,
    accountant: CostAccountant,
    clothing_detail_budget: usize,
    reference_detail_budget: usize,
}

impl ImageOrchestrator {
    pub fn new(
        backends: Vec<Arc<dyn ImageBackend>>,
        analyzer: Arc<ClothingAnalyzer>,
        accountant: CostAccountant,
        clothing_detail_budget: usize,
        reference_detail_budget: usize,
    ) -> Self {
        ImageOrchestrator {
            backends,
            analyzer,
            accountant,
            clothing_detail_budget,
            reference_detail_budget,
        }
    }

    fn backend(&self, kind: BackendKind) -> Option<&Arc<dyn ImageBackend>> {
        self.backends.iter().find(|backend| backend.kind() == kind)
    }

    fn detail_budget(&self, kind: BackendKind) -> usize {
        if kind.is_primary() {
            self.clothing_detail_budget
        } else {
            self.reference_detail_budget
        }
    }

    async fn invoke(
        &self,
        kind: BackendKind,
        prompt: &str,
        reference: Option<&[u8]>,
    ) -> Result<RenderedImage, ImageGenerationError> {
        match self.backend(kind) {
            Some(backend) => backend.attempt(prompt, reference).await,
            None => Err(ImageGenerationError::NotConfigured(kind)),
        }
    }

    /// Renders the outfit. A non-primary backend that fails falls back to the
    /// primary exactly once; a primary failure ends with no image and zero cost.
    pub async fn render(&self, request: GenerationRequest<'_>) -> RenderOutcome {
        let requested = BackendKind::from_name(request.backend);
        let original = request.original_image.filter(|bytes| !bytes.is_empty());
        let mut degradations = Vec::new();

        let analysis = match original {
            Some(image) => self.analyzer.analyze(image).await,
            None => ClothingAnalysis::unavailable(),
        };
        if original.is_some() && !analysis.available {
            degradations.push(Degradation::ClothingAnalysisUnavailable);
        }

        let model_description = model_description_for_location(request.location);
        let mut attempts = Vec::new();
        let mut state = RenderState::Attempt(requested);

        loop {
            state = match state {
                RenderState::Attempt(kind) => {
                    attempts.push(kind);
                    let reference = original.filter(|_| kind.accepts_reference());
                    let prompt = build_model_image_prompt(
                        kind,
                        request.suggestion,
                        model_description,
                        analysis.details(),
                        reference.is_some(),
                        self.detail_budget(kind),
                    );
                    info!(
                        "Rendering outfit with {} (prompt_chars={}, reference={})",
                        kind,
                        prompt.chars().count(),
                        reference.is_some()
                    );

                    match self.invoke(kind, &prompt, reference).await {
                        Ok(image) => RenderState::Done(kind, image),
                        Err(err) if kind.is_primary() => {
                            warn!("Primary image backend failed: {err}");
                            RenderState::Failed
                        }
                        Err(err) => {
                            warn!(
                                "Image backend {} failed, falling back to {}: {err}",
                                kind,
                                BackendKind::PRIMARY
                            );
                            RenderState::Attempt(BackendKind::PRIMARY)
                        }
                    }
                }
                RenderState::Done(kind, image) => {
                    let image_cost = self
                        .accountant
                        .image_cost(kind, &image.resolution, &image.quality);
                    return RenderOutcome {
                        image: Some(image.bytes),
                        image_cost,
                        backend: Some(kind),
                        attempts,
                        analysis_usage: analysis.usage,
                        degradations,
                    };
                }
                RenderState::Failed => {
                    degradations.push(Degradation::ImageGenerationFailed);
                    return RenderOutcome {
                        image: None,
                        image_cost: 0.0,
                        backend: None,
                        attempts,
                        analysis_usage: analysis.usage,
                        degradations,
                    };
                }
            };
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{Config, PricingConfig};
    use crate::llm::{VisionModel, VisionParams, VisionReply};
    use crate::outfit::parser::default_suggestion;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    pub(crate) struct FakeBackend {
        kind: BackendKind,
        succeed: bool,
        pub(crate) prompts: Mutex<Vec<String>>,
        pub(crate) references: Mutex<Vec<bool>>,
    }

    impl FakeBackend {
        pub(crate) fn new(kind: BackendKind, succeed: bool) -> Arc<Self> {
            Arc::new(FakeBackend {
                kind,
                succeed,
                prompts: Mutex::new(Vec::new()),
                references: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().len()
        }
    }

    #[async_trait]
    impl ImageBackend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn attempt(
            &self,
            prompt: &str,
            reference: Option<&[u8]>,
        ) -> Result<RenderedImage, ImageGenerationError> {
            self.prompts.lock().push(prompt.to_string());
            self.references.lock().push(reference.is_some());
            if self.succeed {
                Ok(RenderedImage {
                    bytes: vec![1, 2, 3],
                    resolution: "1024x1792".to_string(),
                    quality: "standard".to_string(),
                })
            } else {
                Err(ImageGenerationError::failed(self.kind, "service down"))
            }
        }
    }

    pub(crate) struct EchoVision;

    #[async_trait]
    impl VisionModel for EchoVision {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn describe(
            &self,
            _instruction: &str,
            _image: &[u8],
            _params: &VisionParams,
        ) -> anyhow::Result<VisionReply> {
            Ok(VisionReply {
                text: "PRIMARY COLOR: Burgundy red, solid poplin".to_string(),
                usage: TokenUsage::new(700, 200),
            })
        }
    }

    fn orchestrator(fakes: &[&Arc<FakeBackend>]) -> ImageOrchestrator {
        let backends = fakes
            .iter()
            .map(|fake| Arc::clone(*fake) as Arc<dyn ImageBackend>)
            .collect();
        let config = Config::default();
        let analyzer = Arc::new(ClothingAnalyzer::new(Arc::new(EchoVision), &config));
        ImageOrchestrator::new(
            backends,
            analyzer,
            CostAccountant::new(PricingConfig::default()),
            config.clothing_detail_budget,
            config.reference_detail_budget,
        )
    }

    fn request<'a>(
        suggestion: &'a OutfitSuggestion,
        image: Option<&'a [u8]>,
        backend: &'a str,
    ) -> GenerationRequest<'a> {
        GenerationRequest {
            suggestion,
            original_image: image,
            location: Some("London, UK"),
            backend,
        }
    }

    #[tokio::test]
    async fn failing_secondary_falls_back_to_primary_once() {
        let primary = FakeBackend::new(BackendKind::Dalle3, true);
        let secondary = FakeBackend::new(BackendKind::StableDiffusion, false);
        let orchestrator = orchestrator(&[&primary, &secondary]);
        let suggestion = default_suggestion();

        let outcome = orchestrator
            .render(request(&suggestion, None, "stable-diffusion"))
            .await;

        assert_eq!(secondary.calls(), 1);
        assert_eq!(primary.calls(), 1);
        assert_eq!(
            outcome.attempts,
            vec![BackendKind::StableDiffusion, BackendKind::Dalle3]
        );
        assert_eq!(outcome.backend, Some(BackendKind::Dalle3));
        assert_eq!(outcome.image_cost, 0.04);
        assert!(outcome.image.is_some());
    }

    #[tokio::test]
    async fn failing_primary_is_not_retried() {
        let primary = FakeBackend::new(BackendKind::Dalle3, false);
        let orchestrator = orchestrator(&[&primary]);
        let suggestion = default_suggestion();

        let outcome = orchestrator.render(request(&suggestion, None, "dalle3")).await;

        assert_eq!(primary.calls(), 1);
        assert!(outcome.image.is_none());
        assert_eq!(outcome.image_cost, 0.0);
        assert_eq!(outcome.degradations, vec![Degradation::ImageGenerationFailed]);
    }

    #[tokio::test]
    async fn both_failing_stops_after_two_invocations() {
        let primary = FakeBackend::new(BackendKind::Dalle3, false);
        let secondary = FakeBackend::new(BackendKind::NanoBanana, false);
        let orchestrator = orchestrator(&[&primary, &secondary]);
        let suggestion = default_suggestion();

        let outcome = orchestrator
            .render(request(&suggestion, Some(&b"photo"[..]), "nano-banana"))
            .await;

        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(primary.calls() + secondary.calls(), 2);
        assert!(outcome.image.is_none());
        assert_eq!(outcome.image_cost, 0.0);
        assert_eq!(outcome.analysis_usage, TokenUsage::new(700, 200));
    }

    #[tokio::test]
    async fn unconfigured_backend_counts_as_failed_attempt() {
        let primary = FakeBackend::new(BackendKind::Dalle3, true);
        let orchestrator = orchestrator(&[&primary]);
        let suggestion = default_suggestion();

        let outcome = orchestrator
            .render(request(&suggestion, None, "nano-banana"))
            .await;

        assert_eq!(primary.calls(), 1);
        assert_eq!(outcome.backend, Some(BackendKind::Dalle3));
    }

    #[tokio::test]
    async fn unknown_backend_names_use_primary() {
        let primary = FakeBackend::new(BackendKind::Dalle3, true);
        let orchestrator = orchestrator(&[&primary]);
        let suggestion = default_suggestion();

        let outcome = orchestrator.render(request(&suggestion, None, "imagen")).await;

        assert_eq!(outcome.attempts, vec![BackendKind::Dalle3]);
    }

    #[tokio::test]
    async fn uploaded_photo_is_described_and_only_sent_to_reference_backends() {
        let primary = FakeBackend::new(BackendKind::Dalle3, true);
        let nano = FakeBackend::new(BackendKind::NanoBanana, true);
        let orchestrator = orchestrator(&[&primary, &nano]);
        let suggestion = default_suggestion();
        let photo: &[u8] = b"photo";

        orchestrator
            .render(request(&suggestion, Some(photo), "dalle3"))
            .await;
        orchestrator
            .render(request(&suggestion, Some(photo), "nano-banana"))
            .await;

        assert_eq!(*primary.references.lock(), vec![false]);
        assert_eq!(*nano.references.lock(), vec![true]);
        assert!(primary.prompts.lock()[0].contains("Burgundy red"));
        assert!(primary.prompts.lock()[0].contains("British male model"));
    }
}
