use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;

use crate::outfit::types::{
    normalize_color, ClothingCategory, HistoryEntry, OutfitSuggestion, WardrobeItem,
};

#[derive(Debug, Clone, FromRow)]
pub struct WardrobeRow {
    pub id: i64,
    pub owner_id: i64,
    pub category: String,
    pub name: String,
    pub color: String,
    pub description: String,
    pub brand: String,
    pub image: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl WardrobeRow {
    pub fn into_item(self) -> WardrobeItem {
        let category = ClothingCategory::parse(&self.category).unwrap_or_else(|| {
            warn!(
                "Wardrobe item {} has unknown category '{}'; treating as other",
                self.id, self.category
            );
            ClothingCategory::Other
        });
        WardrobeItem {
            id: self.id,
            owner_id: self.owner_id,
            category,
            name: self.name,
            color: normalize_color(&self.color),
            description: self.description,
            brand: self.brand,
            image: self.image.filter(|bytes| !bytes.is_empty()),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: i64,
    pub owner_id: i64,
    pub text_input: String,
    pub image: Option<Vec<u8>>,
    pub suggestion_json: String,
    pub model_image: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl HistoryRow {
    /// `None` when the stored suggestion no longer deserializes.
    pub fn into_entry(self) -> Option<HistoryEntry> {
        let mut suggestion: OutfitSuggestion = match serde_json::from_str(&self.suggestion_json)
        {
            Ok(suggestion) => suggestion,
            Err(err) => {
                warn!("Skipping history entry {}: stored suggestion is invalid: {err}", self.id);
                return None;
            }
        };
        suggestion.model_image = self.model_image.filter(|bytes| !bytes.is_empty());
        Some(HistoryEntry {
            id: self.id,
            owner_id: self.owner_id,
            text_input: self.text_input,
            image: self.image.filter(|bytes| !bytes.is_empty()),
            suggestion,
            created_at: self.created_at,
        })
    }
}
