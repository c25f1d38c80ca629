use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::outfit::types::OutfitSuggestion;

pub const DEFAULT_SHIRT: &str = "Classic white dress shirt";
pub const DEFAULT_TROUSER: &str = "Dark navy dress trousers";
pub const DEFAULT_BLAZER: &str = "Charcoal gray blazer";
pub const DEFAULT_SHOES: &str = "Black leather dress shoes";
pub const DEFAULT_BELT: &str = "Black leather belt";
pub const DEFAULT_REASONING: &str =
    "A classic professional look that works for most business occasions.";
pub const FALLBACK_REASONING: &str =
    "A professional outfit suggestion based on your uploaded image.";

const FIELD_NAMES: [&str; 6] = ["shirt", "trouser", "blazer", "shoes", "belt", "reasoning"];

#[derive(Debug, Clone)]
pub struct ParsedSuggestion {
    pub suggestion: OutfitSuggestion,
    /// No JSON object could be recovered from the text.
    pub malformed: bool,
    /// Field names that were missing, blank or not strings.
    pub defaulted: Vec<&'static str>,
}

impl ParsedSuggestion {
    pub fn is_clean(&self) -> bool {
        !self.malformed && self.defaulted.is_empty()
    }
}

/// Suggestion used when nothing could be recovered from the model output.
pub fn default_suggestion() -> OutfitSuggestion {
    OutfitSuggestion {
        shirt: DEFAULT_SHIRT.to_string(),
        trouser: DEFAULT_TROUSER.to_string(),
        blazer: DEFAULT_BLAZER.to_string(),
        shoes: DEFAULT_SHOES.to_string(),
        belt: DEFAULT_BELT.to_string(),
        reasoning: FALLBACK_REASONING.to_string(),
        model_image: None,
        matching_wardrobe_items: None,
        cost: None,
    }
}

fn extract_object(raw: &str) -> Option<Map<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(err) => {
            debug!("Suggestion JSON did not parse: {err}");
            None
        }
    }
}

pub fn parse_suggestion(raw: &str) -> OutfitSuggestion {
    parse_suggestion_with_report(raw).suggestion
}

pub fn parse_suggestion_with_report(raw: &str) -> ParsedSuggestion {
    let Some(object) = extract_object(raw) else {
        warn!(
            "Suggestion response contained no usable JSON object ({} chars); using defaults",
            raw.chars().count()
        );
        return ParsedSuggestion {
            suggestion: default_suggestion(),
            malformed: true,
            defaulted: FIELD_NAMES.to_vec(),
        };
    };

    let mut defaulted = Vec::new();
    let mut field = |name: &'static str, fallback: &str| -> String {
        match object.get(name).and_then(|value| value.as_str()) {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => {
                defaulted.push(name);
                fallback.to_string()
            }
        }
    };

    let suggestion = OutfitSuggestion {
        shirt: field("shirt", DEFAULT_SHIRT),
        trouser: field("trouser", DEFAULT_TROUSER),
        blazer: field("blazer", DEFAULT_BLAZER),
        shoes: field("shoes", DEFAULT_SHOES),
        belt: field("belt", DEFAULT_BELT),
        reasoning: field("reasoning", DEFAULT_REASONING),
        model_image: None,
        matching_wardrobe_items: None,
        cost: None,
    };

    if !defaulted.is_empty() {
        warn!("Suggestion response missing fields {:?}; defaults applied", defaulted);
    }

    ParsedSuggestion {
        suggestion,
        malformed: false,
        defaulted,
    }
}
