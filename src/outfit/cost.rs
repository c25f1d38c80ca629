use serde::{Deserialize, Serialize};

use crate::config::PricingConfig;
use crate::outfit::types::BackendKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        TokenUsage {
            input_tokens,
            output_tokens,
        }
    }
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
        }
    }
}

/// Cost estimate in USD. The total is always derived from the two parts;
/// a total arriving from outside is ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CostBreakdownFields")]
pub struct CostBreakdown {
    text_cost: f64,
    image_cost: f64,
    total_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct CostBreakdownFields {
    #[serde(default)]
    text_cost: f64,
    #[serde(default)]
    image_cost: f64,
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

impl From<CostBreakdownFields> for CostBreakdown {
    fn from(fields: CostBreakdownFields) -> Self {
        let mut breakdown = CostBreakdown::new(fields.text_cost, fields.image_cost);
        breakdown.input_tokens = fields.input_tokens;
        breakdown.output_tokens = fields.output_tokens;
        breakdown
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        round_usd(value)
    } else {
        0.0
    }
}

fn round_usd(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

impl CostBreakdown {
    pub fn new(text_cost: f64, image_cost: f64) -> Self {
        let text_cost = sanitize(text_cost);
        let image_cost = sanitize(image_cost);
        CostBreakdown {
            text_cost,
            image_cost,
            total_cost: text_cost + image_cost,
            input_tokens: None,
            output_tokens: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.input_tokens = Some(usage.input_tokens);
        self.output_tokens = Some(usage.output_tokens);
        self
    }

    pub fn text_cost(&self) -> f64 {
        self.text_cost
    }

    pub fn image_cost(&self) -> f64 {
        self.image_cost
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn input_tokens(&self) -> Option<u64> {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> Option<u64> {
        self.output_tokens
    }
}

#[derive(Debug, Clone)]
pub struct CostAccountant {
    pricing: PricingConfig,
}

impl CostAccountant {
    pub fn new(pricing: PricingConfig) -> Self {
        CostAccountant { pricing }
    }

    pub fn text_cost(&self, usage: TokenUsage, has_image: bool) -> f64 {
        let input = usage.input_tokens as f64 / 1_000_000.0 * self.pricing.text_input_per_million;
        let output =
            usage.output_tokens as f64 / 1_000_000.0 * self.pricing.text_output_per_million;
        let surcharge = if has_image {
            self.pricing.vision_image_surcharge
        } else {
            0.0
        };
        round_usd(input + output + surcharge)
    }

    /// Square renders are always billed at the standard rate on the primary
    /// renderer; tall and wide ones depend on the quality tier.
    pub fn image_cost(&self, backend: BackendKind, resolution: &str, quality: &str) -> f64 {
        match backend {
            BackendKind::Dalle3 => {
                if resolution.trim() == "1024x1024" {
                    self.pricing.dalle_standard
                } else if quality.trim().eq_ignore_ascii_case("hd") {
                    self.pricing.dalle_hd
                } else {
                    self.pricing.dalle_standard
                }
            }
            BackendKind::StableDiffusion => self.pricing.stable_diffusion,
            BackendKind::NanoBanana => self.pricing.nano_banana,
        }
    }

    pub fn breakdown(&self, usage: TokenUsage, has_image: bool, image_cost: f64) -> CostBreakdown {
        CostBreakdown::new(self.text_cost(usage, has_image), image_cost).with_usage(usage)
    }
}

pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("${cost:.4}")
    } else if cost < 0.10 {
        format!("${cost:.3}")
    } else {
        format!("${cost:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accountant() -> CostAccountant {
        CostAccountant::new(PricingConfig::default())
    }

    #[test]
    fn text_cost_includes_image_surcharge() {
        let accountant = accountant();
        let usage = TokenUsage::new(1000, 500);
        let without = accountant.text_cost(usage, false);
        let with = accountant.text_cost(usage, true);
        assert!((without - 0.0075).abs() < 1e-9);
        assert!((with - 0.0175).abs() < 1e-9);
    }

    #[test]
    fn dalle_pricing_depends_on_resolution_and_quality() {
        let accountant = accountant();
        assert_eq!(accountant.image_cost(BackendKind::Dalle3, "1024x1024", "hd"), 0.04);
        assert_eq!(accountant.image_cost(BackendKind::Dalle3, "1024x1792", "hd"), 0.08);
        assert_eq!(
            accountant.image_cost(BackendKind::Dalle3, "1024x1792", "standard"),
            0.04
        );
        assert_eq!(
            accountant.image_cost(BackendKind::StableDiffusion, "", ""),
            0.0023
        );
        assert_eq!(accountant.image_cost(BackendKind::NanoBanana, "", ""), 0.001);
    }

    #[test]
    fn total_is_sum_of_parts() {
        let accountant = accountant();
        for (usage, image_cost) in [
            (TokenUsage::new(0, 0), 0.0),
            (TokenUsage::new(1234, 567), 0.0),
            (TokenUsage::new(1234, 567), 0.04),
            (TokenUsage::new(98_765, 4_321), 0.0023),
        ] {
            let breakdown = accountant.breakdown(usage, true, image_cost);
            assert_eq!(
                breakdown.total_cost(),
                breakdown.text_cost() + breakdown.image_cost()
            );
        }
    }

    #[test]
    fn negative_parts_are_clamped() {
        let breakdown = CostBreakdown::new(-1.0, f64::NAN);
        assert_eq!(breakdown.text_cost(), 0.0);
        assert_eq!(breakdown.image_cost(), 0.0);
        assert_eq!(breakdown.total_cost(), 0.0);
    }

    #[test]
    fn deserialization_recomputes_total() {
        let breakdown: CostBreakdown = serde_json::from_str(
            r#"{"text_cost": 0.01, "image_cost": 0.04, "total_cost": 99.0}"#,
        )
        .unwrap();
        assert_eq!(breakdown.total_cost(), 0.01 + 0.04);
    }

    #[test]
    fn formats_small_costs_with_more_precision() {
        assert_eq!(format_cost(0.0023), "$0.0023");
        assert_eq!(format_cost(0.045), "$0.045");
        assert_eq!(format_cost(1.5), "$1.50");
    }
}
