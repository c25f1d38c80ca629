use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::llm::media::truncate_for_log;
use crate::llm::{VisionModel, VisionParams};
use crate::outfit::cost::TokenUsage;
use crate::outfit::prompt::CLOTHING_ANALYSIS_PROMPT;

pub const NO_DESCRIPTION: &str = "no description available";

#[derive(Debug, Clone)]
pub struct ClothingAnalysis {
    pub description: String,
    pub usage: TokenUsage,
    pub available: bool,
}

impl ClothingAnalysis {
    pub fn unavailable() -> Self {
        ClothingAnalysis {
            description: NO_DESCRIPTION.to_string(),
            usage: TokenUsage::default(),
            available: false,
        }
    }

    /// The description to feed a render prompt, if there is a real one.
    pub fn details(&self) -> Option<&str> {
        self.available.then_some(self.description.as_str())
    }
}

/// Secondary vision call describing the uploaded garment in detail.
pub struct ClothingAnalyzer {
    vision: Arc<dyn VisionModel>,
    params: VisionParams,
}

impl ClothingAnalyzer {
    pub fn new(vision: Arc<dyn VisionModel>, config: &Config) -> Self {
        ClothingAnalyzer {
            vision,
            params: VisionParams {
                max_tokens: config.analysis_max_tokens,
                temperature: config.analysis_temperature,
                operation: "clothing_analysis",
            },
        }
    }

    /// Never fails; a failed or empty analysis yields `NO_DESCRIPTION`.
    pub async fn analyze(&self, image: &[u8]) -> ClothingAnalysis {
        if image.is_empty() {
            return ClothingAnalysis::unavailable();
        }

        match self
            .vision
            .describe(CLOTHING_ANALYSIS_PROMPT, image, &self.params)
            .await
        {
            Ok(reply) if !reply.text.trim().is_empty() => {
                info!(
                    "Clothing analysis complete: {}",
                    truncate_for_log(&reply.text, 120)
                );
                ClothingAnalysis {
                    description: reply.text.trim().to_string(),
                    usage: reply.usage,
                    available: true,
                }
            }
            Ok(reply) => {
                warn!("Clothing analysis returned an empty description");
                ClothingAnalysis {
                    usage: reply.usage,
                    ..ClothingAnalysis::unavailable()
                }
            }
            Err(err) => {
                warn!("Failed to analyze uploaded clothing: {err}");
                ClothingAnalysis::unavailable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::VisionReply;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct ScriptedVision {
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl VisionModel for ScriptedVision {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn describe(
            &self,
            instruction: &str,
            _image: &[u8],
            params: &VisionParams,
        ) -> anyhow::Result<VisionReply> {
            assert!(instruction.contains("PRIMARY COLOR"));
            assert_eq!(params.operation, "clothing_analysis");
            match self.reply {
                Some(text) => Ok(VisionReply {
                    text: text.to_string(),
                    usage: TokenUsage::new(900, 300),
                }),
                None => Err(anyhow!("quota exceeded")),
            }
        }
    }

    fn analyzer(reply: Option<&'static str>) -> ClothingAnalyzer {
        ClothingAnalyzer::new(Arc::new(ScriptedVision { reply }), &Config::default())
    }

    #[tokio::test]
    async fn successful_analysis_reports_usage() {
        let analysis = analyzer(Some("PRIMARY COLOR: Navy blue")).analyze(b"img").await;
        assert!(analysis.available);
        assert_eq!(analysis.details(), Some("PRIMARY COLOR: Navy blue"));
        assert_eq!(analysis.usage, TokenUsage::new(900, 300));
    }

    #[tokio::test]
    async fn failures_yield_no_description() {
        let analysis = analyzer(None).analyze(b"img").await;
        assert!(!analysis.available);
        assert_eq!(analysis.description, NO_DESCRIPTION);
        assert_eq!(analysis.details(), None);

        let empty = analyzer(Some("   ")).analyze(b"img").await;
        assert_eq!(empty.description, NO_DESCRIPTION);
        assert_eq!(empty.usage, TokenUsage::new(900, 300));
    }
}
