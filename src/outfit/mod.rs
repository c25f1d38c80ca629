pub mod analyzer;
pub mod cost;
pub mod duplicate;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod render;
pub mod types;
pub mod wardrobe;

pub use cost::{CostAccountant, CostBreakdown, TokenUsage};
pub use pipeline::SuggestionPipeline;
pub use types::{
    BackendKind, ClothingCategory, HistoryEntry, OutfitSuggestion, Slot, WardrobeItem,
    WardrobeMatches,
};
