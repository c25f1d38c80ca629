use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::outfit::types::{OutfitSuggestion, Slot, WardrobeItem, WardrobeMatches};

/// Words that qualify a colour without naming one.
const SHADE_MODIFIERS: &[&str] = &[
    "dark", "light", "deep", "pale", "bright", "medium", "muted", "soft", "and", "with",
];

static GREY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bgrey\b").expect("valid grey regex"));
static WORD_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid word split regex"));

fn normalize(value: &str) -> String {
    GREY_RE
        .replace_all(&value.trim().to_lowercase(), "gray")
        .into_owned()
}

fn word_regex(pattern: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{pattern}\b")).ok()
}

fn color_words(color: &str) -> Vec<String> {
    WORD_SPLIT_RE
        .split(color)
        .filter(|word| !word.is_empty())
        .map(|word| word.to_string())
        .collect()
}

/// Whether an owned colour appears in suggested slot text. The whole colour
/// phrase matches first; otherwise any significant word of it does. Matching
/// is case-insensitive and word-bounded, and "unknown" never matches.
pub fn color_matches(owned_color: &str, suggested: &str) -> bool {
    let color = normalize(owned_color);
    if color.is_empty() || color == "unknown" {
        return false;
    }
    let text = normalize(suggested);
    if text.is_empty() {
        return false;
    }

    let words = color_words(&color);
    if words.is_empty() {
        return false;
    }

    let phrase = words
        .iter()
        .map(|word| regex::escape(word))
        .collect::<Vec<_>>()
        .join(r"[\s-]+");
    if word_regex(&phrase).is_some_and(|re| re.is_match(&text)) {
        return true;
    }

    if words.len() == 1 {
        return false;
    }

    words
        .iter()
        .filter(|word| word.chars().count() >= 3 && !SHADE_MODIFIERS.contains(&word.as_str()))
        .any(|word| word_regex(&regex::escape(word)).is_some_and(|re| re.is_match(&text)))
}

/// Maps each of the five slots to the owned items that could fill it.
pub fn match_wardrobe(suggestion: &OutfitSuggestion, garments: &[WardrobeItem]) -> WardrobeMatches {
    let mut matches: WardrobeMatches = Slot::ALL.iter().map(|slot| (*slot, Vec::new())).collect();

    for item in garments {
        let Some(slot) = Slot::for_category(item.category) else {
            continue;
        };
        if !item.has_known_color() {
            continue;
        }
        if color_matches(&item.color, suggestion.slot_text(slot)) {
            if let Some(bucket) = matches.get_mut(&slot) {
                bucket.push(item.clone());
            }
        }
    }

    debug!(
        "Wardrobe matching: {} garments, {} matched",
        garments.len(),
        matches.values().map(Vec::len).sum::<usize>()
    );
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outfit::parser::default_suggestion;
    use crate::outfit::types::ClothingCategory;

    #[test]
    fn multi_word_colors_match_whole_or_by_significant_word() {
        assert!(color_matches("Navy Blue", "A navy blue oxford shirt"));
        assert!(color_matches("Navy Blue", "Slim navy chinos"));
        assert!(color_matches("navy blue", "NAVY-BLUE knit"));
        assert!(!color_matches("Navy Blue", "Charcoal gray blazer"));
    }

    #[test]
    fn color_matching_respects_word_boundaries() {
        assert!(!color_matches("Tan", "Tangerine linen shirt"));
        assert!(color_matches("Tan", "Tan suede loafers"));
        assert!(!color_matches("Red", "Tailored trousers"));
    }

    #[test]
    fn shade_modifiers_alone_do_not_match() {
        assert!(!color_matches("Dark Green", "Dark navy dress trousers"));
        assert!(color_matches("Dark Green", "Forest green cardigan"));
    }

    #[test]
    fn grey_and_gray_are_the_same_color() {
        assert!(color_matches("Charcoal Grey", "Charcoal gray blazer"));
        assert!(color_matches("grey", "Light gray trousers"));
    }

    #[test]
    fn unknown_or_empty_colors_never_match() {
        assert!(!color_matches("unknown", "unknown colour shirt"));
        assert!(!color_matches("", "white shirt"));
    }

    #[test]
    fn matches_cover_every_slot_and_use_category_synonyms() {
        let suggestion = default_suggestion();
        let garments = vec![
            WardrobeItem::new(1, ClothingCategory::Polo, "Pique polo", "White"),
            WardrobeItem::new(1, ClothingCategory::Jeans, "Raw denim", "Navy"),
            WardrobeItem::new(1, ClothingCategory::Shoes, "Derby", "Black"),
            WardrobeItem::new(1, ClothingCategory::Shoes, "Sneaker", "unknown"),
            WardrobeItem::new(1, ClothingCategory::Tie, "Silk tie", "Black"),
        ];
        let matches = match_wardrobe(&suggestion, &garments);
        assert_eq!(matches.len(), 5);
        assert_eq!(matches[&Slot::Shirt].len(), 1);
        assert_eq!(matches[&Slot::Trouser][0].name, "Raw denim");
        assert_eq!(matches[&Slot::Shoes].len(), 1);
        assert!(matches[&Slot::Blazer].is_empty());
        assert!(matches[&Slot::Belt].is_empty());
    }
}
