use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outfit::cost::CostBreakdown;
use crate::utils::encoding::base64_opt;

pub const UNKNOWN_COLOR: &str = "unknown";

/// The five matchable outfit slots. The rationale is not a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Shirt,
    Trouser,
    Blazer,
    Shoes,
    Belt,
}

impl Slot {
    pub const ALL: [Slot; 5] = [
        Slot::Shirt,
        Slot::Trouser,
        Slot::Blazer,
        Slot::Shoes,
        Slot::Belt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Shirt => "shirt",
            Slot::Trouser => "trouser",
            Slot::Blazer => "blazer",
            Slot::Shoes => "shoes",
            Slot::Belt => "belt",
        }
    }

    /// Which slot an owned garment of this category can fill, if any.
    pub fn for_category(category: ClothingCategory) -> Option<Slot> {
        match category {
            ClothingCategory::Shirt | ClothingCategory::Polo | ClothingCategory::TShirt => {
                Some(Slot::Shirt)
            }
            ClothingCategory::Trouser | ClothingCategory::Jeans | ClothingCategory::Shorts => {
                Some(Slot::Trouser)
            }
            ClothingCategory::Blazer | ClothingCategory::Jacket => Some(Slot::Blazer),
            ClothingCategory::Shoes => Some(Slot::Shoes),
            ClothingCategory::Belt => Some(Slot::Belt),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClothingCategory {
    Shirt,
    Trouser,
    Blazer,
    Jacket,
    Shoes,
    Belt,
    Tie,
    Suit,
    Sweater,
    Polo,
    TShirt,
    Jeans,
    Shorts,
    Other,
}

impl ClothingCategory {
    pub const ALL: [ClothingCategory; 14] = [
        ClothingCategory::Shirt,
        ClothingCategory::Trouser,
        ClothingCategory::Blazer,
        ClothingCategory::Jacket,
        ClothingCategory::Shoes,
        ClothingCategory::Belt,
        ClothingCategory::Tie,
        ClothingCategory::Suit,
        ClothingCategory::Sweater,
        ClothingCategory::Polo,
        ClothingCategory::TShirt,
        ClothingCategory::Jeans,
        ClothingCategory::Shorts,
        ClothingCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClothingCategory::Shirt => "shirt",
            ClothingCategory::Trouser => "trouser",
            ClothingCategory::Blazer => "blazer",
            ClothingCategory::Jacket => "jacket",
            ClothingCategory::Shoes => "shoes",
            ClothingCategory::Belt => "belt",
            ClothingCategory::Tie => "tie",
            ClothingCategory::Suit => "suit",
            ClothingCategory::Sweater => "sweater",
            ClothingCategory::Polo => "polo",
            ClothingCategory::TShirt => "t_shirt",
            ClothingCategory::Jeans => "jeans",
            ClothingCategory::Shorts => "shorts",
            ClothingCategory::Other => "other",
        }
    }

    /// Case-insensitive lookup; `None` for names outside the fixed set.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase().replace(['-', ' '], "_");
        let normalized = match normalized.as_str() {
            "trousers" | "pants" => "trouser",
            "tshirt" | "tee" => "t_shirt",
            other => other,
        }
        .to_string();
        ClothingCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
    }
}

impl fmt::Display for ClothingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image-generation backends. `Dalle3` is the primary renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "dalle3")]
    Dalle3,
    #[serde(rename = "stable-diffusion")]
    StableDiffusion,
    #[serde(rename = "nano-banana")]
    NanoBanana,
}

impl BackendKind {
    pub const PRIMARY: BackendKind = BackendKind::Dalle3;

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Dalle3 => "dalle3",
            BackendKind::StableDiffusion => "stable-diffusion",
            BackendKind::NanoBanana => "nano-banana",
        }
    }

    /// Unrecognised names select the primary backend.
    pub fn from_name(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "stable-diffusion" | "stable_diffusion" | "sdxl" => BackendKind::StableDiffusion,
            "nano-banana" | "nano_banana" | "nanobanana" => BackendKind::NanoBanana,
            _ => BackendKind::Dalle3,
        }
    }

    pub fn is_primary(&self) -> bool {
        *self == BackendKind::PRIMARY
    }

    /// Hard prompt-length ceiling enforced by the service.
    pub fn prompt_ceiling(&self) -> usize {
        match self {
            BackendKind::Dalle3 => 4000,
            BackendKind::StableDiffusion => 2000,
            BackendKind::NanoBanana => 2000,
        }
    }

    pub fn accepts_reference(&self) -> bool {
        matches!(self, BackendKind::NanoBanana)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardrobeItem {
    pub id: i64,
    pub owner_id: i64,
    pub category: ClothingCategory,
    pub name: String,
    pub color: String,
    pub description: String,
    pub brand: String,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,
}

impl WardrobeItem {
    pub fn new(
        owner_id: i64,
        category: ClothingCategory,
        name: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        WardrobeItem {
            id: 0,
            owner_id,
            category,
            name: name.into(),
            color: normalize_color(&color.into()),
            description: String::new(),
            brand: String::new(),
            image: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }

    pub fn has_known_color(&self) -> bool {
        let color = self.color.trim();
        !color.is_empty() && !color.eq_ignore_ascii_case(UNKNOWN_COLOR)
    }
}

/// Owned colours are never empty; blanks become the "unknown" sentinel.
pub fn normalize_color(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN_COLOR.to_string()
    } else {
        trimmed.to_string()
    }
}

pub type WardrobeMatches = BTreeMap<Slot, Vec<WardrobeItem>>;

/// Owned items grouped by category, as fed to the prompt builder.
pub type OwnedItems = BTreeMap<ClothingCategory, Vec<WardrobeItem>>;

pub fn group_by_category(items: &[WardrobeItem]) -> OwnedItems {
    let mut grouped = OwnedItems::new();
    for item in items {
        grouped.entry(item.category).or_default().push(item.clone());
    }
    grouped
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutfitSuggestion {
    pub shirt: String,
    pub trouser: String,
    pub blazer: String,
    pub shoes: String,
    pub belt: String,
    pub reasoning: String,
    #[serde(default, with = "base64_opt")]
    pub model_image: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_wardrobe_items: Option<WardrobeMatches>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostBreakdown>,
}

impl OutfitSuggestion {
    pub fn slot_text(&self, slot: Slot) -> &str {
        match slot {
            Slot::Shirt => &self.shirt,
            Slot::Trouser => &self.trouser,
            Slot::Blazer => &self.blazer,
            Slot::Shoes => &self.shoes,
            Slot::Belt => &self.belt,
        }
    }

    pub fn text_slots_filled(&self) -> bool {
        Slot::ALL
            .iter()
            .all(|slot| !self.slot_text(*slot).trim().is_empty())
            && !self.reasoning.trim().is_empty()
    }
}

/// A stored suggestion with the photo that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub owner_id: i64,
    pub text_input: String,
    #[serde(skip_serializing)]
    pub image: Option<Vec<u8>>,
    pub suggestion: OutfitSuggestion,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_synonyms_map_to_slots() {
        assert_eq!(Slot::for_category(ClothingCategory::Polo), Some(Slot::Shirt));
        assert_eq!(Slot::for_category(ClothingCategory::Jeans), Some(Slot::Trouser));
        assert_eq!(Slot::for_category(ClothingCategory::Jacket), Some(Slot::Blazer));
        assert_eq!(Slot::for_category(ClothingCategory::Tie), None);
    }

    #[test]
    fn parses_categories_case_insensitively() {
        assert_eq!(ClothingCategory::parse("Shirt"), Some(ClothingCategory::Shirt));
        assert_eq!(ClothingCategory::parse("T-Shirt"), Some(ClothingCategory::TShirt));
        assert_eq!(ClothingCategory::parse("trousers"), Some(ClothingCategory::Trouser));
        assert_eq!(ClothingCategory::parse("cape"), None);
    }

    #[test]
    fn unknown_backend_names_select_primary() {
        assert_eq!(BackendKind::from_name("midjourney"), BackendKind::Dalle3);
        assert_eq!(BackendKind::from_name(""), BackendKind::PRIMARY);
        assert_eq!(
            BackendKind::from_name("Stable-Diffusion"),
            BackendKind::StableDiffusion
        );
        assert_eq!(BackendKind::from_name("nano-banana"), BackendKind::NanoBanana);
    }

    #[test]
    fn blank_colors_become_unknown_sentinel() {
        let item = WardrobeItem::new(1, ClothingCategory::Shirt, "Oxford", "  ");
        assert_eq!(item.color, UNKNOWN_COLOR);
        assert!(!item.has_known_color());
    }

    #[test]
    fn wardrobe_matches_serialize_with_slot_names() {
        let mut matches = WardrobeMatches::new();
        matches.insert(Slot::Shoes, Vec::new());
        let value = serde_json::to_value(&matches).unwrap();
        assert!(value.get("shoes").is_some());
    }
}
