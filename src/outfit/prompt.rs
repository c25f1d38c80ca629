use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::outfit::types::{BackendKind, OutfitSuggestion, OwnedItems, WardrobeItem};

pub const DEFAULT_MODEL_DESCRIPTION: &str = "diverse, professional";

pub const CLOTHING_ANALYSIS_PROMPT: &str = "You are describing a garment photo for an image generator that cannot see the photo. \
It will only receive your words, so the garment must be recreatable from them alone. \
Colour accuracy matters more than anything else.

Begin with a colour summary:
PRIMARY COLOR: the exact colour name with its shade (for example \"navy blue\", \"burgundy\", \"charcoal gray\")
SECONDARY COLORS: every other colour with its shade, or \"none\"

Then describe, in this order:
1. ITEM TYPE: dress shirt, blazer, sport coat, polo, t-shirt, sweater and so on.
2. COLORS: specific names only. Never write a bare \"blue\" or \"red\"; name the shade (sky blue, royal blue, crimson, olive). \
State saturation (vivid, muted, pastel) and where each colour appears.
3. PATTERN: solid, stripes, checks, plaid, dots or other. For stripes give direction, width, spacing and colours. \
For checks give size, colours and style (gingham, windowpane, tattersall). For plaid give colours and line weight.
4. MATERIAL: apparent fabric, surface texture, finish and weight.
5. CONSTRUCTION: collar type, buttons (colour, material, placement), pockets, cuffs, lapels.
6. FIT: slim, regular, relaxed or oversized, and the overall cut.
7. DISTINGUISHING MARKS: logos, embroidery, visible text (quoted exactly), contrast stitching.
8. OVERALL: formality level and anything that makes this item unique.

Rules:
- Describe only what is visible. Do not infer, improve or suggest alternatives.
- Be precise about pattern spacing and direction.
- If a detail is unclear, describe what can be seen instead of guessing.";

const RESPONSE_FORMAT: &str = r#"Respond in JSON format with exactly this structure:
{
    "shirt": "detailed description of the shirt (mention if it is from the user's wardrobe)",
    "trouser": "detailed description of the trousers (mention if they are from the user's wardrobe)",
    "blazer": "detailed description of the blazer or jacket (mention if it is from the user's wardrobe)",
    "shoes": "detailed description of the shoes (mention if they are from the user's wardrobe)",
    "belt": "detailed description of the belt (mention if it is from the user's wardrobe)",
    "reasoning": "brief explanation of why this outfit works well together"
}"#;

fn has_owned_items(owned: Option<&OwnedItems>) -> Option<&OwnedItems> {
    owned.filter(|items| items.values().any(|list| !list.is_empty()))
}

fn describe_item(item: &WardrobeItem) -> String {
    let mut parts = Vec::new();
    if !item.name.trim().is_empty() {
        parts.push(format!("Name: {}", item.name.trim()));
    }
    if item.has_known_color() {
        parts.push(format!("Color: {}", item.color.trim()));
    }
    if !item.description.trim().is_empty() {
        parts.push(format!("Description: {}", item.description.trim()));
    }
    if !item.brand.trim().is_empty() {
        parts.push(format!("Brand: {}", item.brand.trim()));
    }
    if parts.is_empty() {
        format!("{} item", item.category)
    } else {
        parts.join(" | ")
    }
}

fn wardrobe_section(owned: &OwnedItems, owned_only: bool) -> String {
    let mut section = String::new();
    if owned_only {
        section.push_str(
            "STRICT CONSTRAINT: the user wants an outfit built only from their wardrobe. \
You MUST NOT suggest any item that is not listed below. \
If no listed item fits a slot, write \"Consider acquiring a [item type]\" for that slot instead of inventing one.\n\n",
        );
    } else {
        section.push_str(
            "IMPORTANT: the user already owns the items below. \
Prefer them wherever they suit the outfit, and only suggest new items when the wardrobe has no suitable option.\n\n",
        );
    }
    section.push_str("USER'S WARDROBE:\n");

    for (category, items) in owned {
        if items.is_empty() {
            continue;
        }
        let _ = writeln!(
            section,
            "\n{} ({} item(s)):",
            category.as_str().to_uppercase(),
            items.len()
        );
        for item in items {
            let _ = writeln!(section, "  - {}", describe_item(item));
        }
    }

    if owned_only {
        section.push_str(
            "\nWhen making recommendations:\n\
1. Use only items from the wardrobe list above\n\
2. Never invent an item that is not listed\n\
3. Build the outfit by combining the listed items\n\
4. For a slot with no suitable item, use the \"Consider acquiring\" note\n",
        );
    } else {
        section.push_str(
            "\nWhen making recommendations:\n\
1. Check the wardrobe first for suitable items\n\
2. When an owned item fits, recommend it and say the user already has it\n\
3. Suggest new items only where the wardrobe falls short\n\
4. Refer to owned items by the name, colour and brand listed above\n",
        );
    }
    section
}

/// Instruction text for the suggestion call.
pub fn build_suggestion_prompt(
    context: &str,
    owned: Option<&OwnedItems>,
    owned_only: bool,
) -> String {
    let mut prompt = String::from(
        "You are a professional fashion stylist. Analyze the uploaded image of a garment \
and provide a complete outfit suggestion.\n",
    );

    if let Some(owned) = has_owned_items(owned) {
        prompt.push('\n');
        prompt.push_str(&wardrobe_section(owned, owned_only));
    }

    let context = context.trim();
    if !context.is_empty() {
        let _ = write!(prompt, "\nAdditional context: {context}\n");
    }

    prompt.push_str(
        "\nProvide a complete outfit recommendation including:\n\
1. Shirt (suggest a complementary one if the image does not show one)\n\
2. Trousers\n\
3. Blazer or jacket (suggest a complementary one if the image does not show one)\n\
4. Shoes\n\
5. Belt\n\
6. Brief reasoning for the outfit choice\n\n\
Consider colour coordination, occasion, style consistency, season, and how formal the context is.\n\n",
    );
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

static SHORT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(usa|us|uk|ksa|uae|gcc)\b").expect("valid country code regex"));

const REGION_KEYWORDS: &[(&[&str], &str)] = &[
    (&["saudi", "saudi arabia"], "Saudi Arabian, Middle Eastern, Arab features, olive skin tone, dark hair, well-groomed beard"),
    (&["united arab emirates", "dubai", "abu dhabi", "emirates", "emirati"], "Emirati, Middle Eastern, Arab features, olive skin tone, dark hair"),
    (&["middle east", "gulf", "qatar", "kuwait", "bahrain"], "Middle Eastern, Arab features, olive to tan skin tone, dark hair"),
    (&["latin", "south america", "mexico", "brazil", "argentina", "colombia"], "Latin American"),
    (&["united states", "america", "american"], "diverse American"),
    (&["united kingdom", "britain", "british", "england", "scotland", "london"], "British"),
    (&["india", "indian", "pakistan", "bangladesh"], "South Asian"),
    (&["china", "chinese"], "East Asian"),
    (&["japan", "japanese"], "Japanese"),
    (&["korea", "korean"], "Korean"),
    (&["africa", "african", "nigeria", "kenya", "ghana"], "African"),
    (&["europe", "european", "france", "germany", "italy", "spain"], "European"),
];

/// One whole-word pattern per region, in table order.
static REGION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    REGION_KEYWORDS
        .iter()
        .map(|(keywords, description)| {
            let alternatives = keywords
                .iter()
                .map(|keyword| regex::escape(keyword).replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = Regex::new(&format!(r"\b(?:{alternatives})\b"))
                .expect("valid region keyword regex");
            (pattern, *description)
        })
        .collect()
});

fn short_code_description(code: &str) -> &'static str {
    match code {
        "usa" | "us" => "diverse American",
        "uk" => "British",
        "ksa" => "Saudi Arabian, Middle Eastern, Arab features, olive skin tone, dark hair, well-groomed beard",
        "uae" => "Emirati, Middle Eastern, Arab features, olive skin tone, dark hair",
        _ => "Middle Eastern, Arab features, olive to tan skin tone, dark hair",
    }
}

/// Maps a free-text location to a model description for the render prompt.
pub fn model_description_for_location(location: Option<&str>) -> &'static str {
    let Some(location) = location.map(str::trim).filter(|value| !value.is_empty()) else {
        return DEFAULT_MODEL_DESCRIPTION;
    };
    let lowered = location.to_lowercase();

    for (pattern, description) in REGION_PATTERNS.iter() {
        if pattern.is_match(&lowered) {
            return description;
        }
    }

    if let Some(found) = SHORT_CODE_RE.find(&lowered) {
        return short_code_description(found.as_str());
    }

    DEFAULT_MODEL_DESCRIPTION
}

pub fn truncate_chars(value: &str, limit: usize) -> &str {
    match value.char_indices().nth(limit) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}

fn primary_prompt(outfit: &OutfitSuggestion, model_description: &str, details: &str) -> String {
    if details.is_empty() {
        return format!(
            "Fashion photo: {model_description} male model, full body head to toe, studio background.\n\n\
COMPLETE OUTFIT (ALL ITEMS MANDATORY):\n\
- Shirt: {shirt}\n\
- MANDATORY BLAZER/JACKET: {blazer} (worn over the shirt, fully visible)\n\
- Trousers: {trouser}\n\
- Shoes: {shoes}\n\
- Belt: {belt}\n\n\
The model must wear every item listed, the blazer clearly visible on the upper body. \
Full body shot with visible shoes. Professional quality.",
            shirt = outfit.shirt,
            blazer = outfit.blazer,
            trouser = outfit.trouser,
            shoes = outfit.shoes,
            belt = outfit.belt,
        );
    }

    format!(
        "TOP PRIORITY: THE USER'S OWN SHIRT.\n\n\
The model must wear this exact shirt. The description below comes from the user's photo and is the only \
information available about it, so recreate it exactly: same colours, same pattern, same construction.\n\n\
SHIRT TO RECREATE:\n{details}\n\n\
COLOUR RULES:\n\
- Use the exact colour names given above, never a similar or close colour\n\
- Keep the stated shade and intensity\n\n\
Fashion catalog photo: {model_description} male model, full body head to toe, studio background.\n\n\
The model wears the shirt described above, plus:\n\
- MANDATORY BLAZER/JACKET: {blazer} (worn over the shirt, clearly present)\n\
- Trousers: {trouser}\n\
- Dress Shoes: {shoes}\n\
- Belt: {belt}\n\n\
Requirements: the shirt matches the description exactly; the blazer is worn and visible; \
shirt, blazer, trousers and shoes all appear in a full body shot; professional fashion photography.",
        blazer = outfit.blazer,
        trouser = outfit.trouser,
        shoes = outfit.shoes,
        belt = outfit.belt,
    )
}

fn alternative_prompt(
    outfit: &OutfitSuggestion,
    model_description: &str,
    details: &str,
    has_reference: bool,
) -> String {
    let mut prompt = if has_reference {
        format!(
            "Professional fashion photo: {model_description} male model, full body head to toe, studio background.\n\n\
Complete the outfit shown in the reference image with:\n\
- MANDATORY BLAZER/JACKET: {blazer} (worn over the shirt, clearly visible)\n\
- Trousers: {trouser}\n\
- Dress Shoes: {shoes}\n\
- Belt: {belt}\n\n\
Full body shot showing the complete outfit. Professional fashion photography, high quality, realistic.",
            blazer = outfit.blazer,
            trouser = outfit.trouser,
            shoes = outfit.shoes,
            belt = outfit.belt,
        )
    } else {
        format!(
            "Professional fashion photo: {model_description} male model, full body head to toe, studio background.\n\n\
Complete outfit (ALL ITEMS MANDATORY):\n\
- Shirt: {shirt}\n\
- MANDATORY BLAZER/JACKET: {blazer} (worn over the shirt, fully visible)\n\
- Trousers: {trouser}\n\
- Shoes: {shoes}\n\
- Belt: {belt}\n\n\
The model wears every item, the blazer clearly visible on the upper body. \
Full body shot. Professional fashion photography, high quality, realistic.",
            shirt = outfit.shirt,
            blazer = outfit.blazer,
            trouser = outfit.trouser,
            shoes = outfit.shoes,
            belt = outfit.belt,
        )
    };

    if !details.is_empty() {
        let _ = write!(
            prompt,
            "\n\nThe model wears the user's own shirt. Recreate it exactly as described.\n\n\
UPLOADED SHIRT (MATCH EXACTLY):\n{details}\n\n\
Same colours, same pattern, same style."
        );
    }
    prompt
}

/// Render prompt for one backend. Clothing details are cut to `detail_budget`
/// characters and the result never exceeds the backend's prompt ceiling.
pub fn build_model_image_prompt(
    backend: BackendKind,
    outfit: &OutfitSuggestion,
    model_description: &str,
    clothing_details: Option<&str>,
    has_reference: bool,
    detail_budget: usize,
) -> String {
    let details = clothing_details
        .map(str::trim)
        .map(|value| truncate_chars(value, detail_budget))
        .unwrap_or("");

    let prompt = match backend {
        BackendKind::Dalle3 => primary_prompt(outfit, model_description, details),
        BackendKind::StableDiffusion | BackendKind::NanoBanana => alternative_prompt(
            outfit,
            model_description,
            details,
            has_reference && backend.accepts_reference(),
        ),
    };

    truncate_chars(prompt.trim(), backend.prompt_ceiling()).to_string()
}
