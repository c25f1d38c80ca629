use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use dotenvy::dotenv;
use serde_json::json;
use tracing::{error, info};

use outfit_suggestor::config::Config;
use outfit_suggestor::outfit::pipeline::{RenderOptions, SuggestionRequest};
use outfit_suggestor::outfit::{ClothingCategory, WardrobeItem};
use outfit_suggestor::state::AppState;
use outfit_suggestor::utils::logging::init_logging;
use outfit_suggestor::utils::upload::validate_upload;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const DUPLICATE_SCAN_LIMIT: usize = 100;

fn usage() -> &'static str {
    "Usage:\n  \
outfit_suggestor suggest --image <path> [--context <text>] [--owner <id>] [--wardrobe-only] [--render] [--backend <dalle3|stable-diffusion|nano-banana>] [--location <text>] [--save] [--output <path>]\n  \
outfit_suggestor check-duplicate --image <path> --owner <id> [--threshold <n>]\n  \
outfit_suggestor history --owner <id> [--limit <n>]\n  \
outfit_suggestor wardrobe add --owner <id> --category <name> --name <text> [--color <text>] [--description <text>] [--brand <text>] [--image <path>]\n  \
outfit_suggestor wardrobe update --owner <id> --id <item> [--category <name>] [--name <text>] [--color <text>] [--description <text>] [--brand <text>] [--image <path>]\n  \
outfit_suggestor wardrobe list --owner <id> [--category <name>]\n  \
outfit_suggestor wardrobe delete --owner <id> --id <item>"
}

#[derive(Debug, Default, PartialEq)]
struct SuggestArgs {
    image: PathBuf,
    context: String,
    owner_id: Option<i64>,
    wardrobe_only: bool,
    render: bool,
    backend: Option<String>,
    location: Option<String>,
    save: bool,
    output: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
struct DuplicateArgs {
    image: PathBuf,
    owner_id: i64,
    threshold: Option<u32>,
}

#[derive(Debug, PartialEq)]
struct HistoryArgs {
    owner_id: i64,
    limit: usize,
}

/// Garment fields given on the command line; unset ones are left alone.
#[derive(Debug, Default, PartialEq)]
struct WardrobeFields {
    category: Option<ClothingCategory>,
    name: Option<String>,
    color: Option<String>,
    description: Option<String>,
    brand: Option<String>,
    image: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
enum WardrobeAction {
    Add {
        owner_id: i64,
        fields: WardrobeFields,
    },
    Update {
        owner_id: i64,
        item_id: i64,
        fields: WardrobeFields,
    },
    List {
        owner_id: i64,
        category: Option<ClothingCategory>,
    },
    Delete {
        owner_id: i64,
        item_id: i64,
    },
}

#[derive(Debug, PartialEq)]
enum CliCommand {
    Suggest(SuggestArgs),
    CheckDuplicate(DuplicateArgs),
    History(HistoryArgs),
    Wardrobe(WardrobeAction),
}

fn value<'a>(args: &'a [String], index: usize, flag: &str) -> anyhow::Result<&'a str> {
    args.get(index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_number<T: std::str::FromStr>(raw: &str, flag: &str) -> anyhow::Result<T> {
    raw.parse::<T>()
        .map_err(|_| anyhow!("Invalid {flag} value: {raw}"))
}

fn parse_args(args: &[String]) -> anyhow::Result<CliCommand> {
    let Some(command) = args.get(1) else {
        return Err(anyhow!(usage()));
    };
    let (action, start) = if command == "wardrobe" {
        (args.get(2).map(|value| value.as_str()), 3)
    } else {
        (None, 2)
    };

    let mut image: Option<PathBuf> = None;
    let mut owner_id: Option<i64> = None;
    let mut item_id: Option<i64> = None;
    let mut threshold: Option<u32> = None;
    let mut limit = DEFAULT_HISTORY_LIMIT;
    let mut suggest = SuggestArgs::default();
    let mut fields = WardrobeFields::default();

    let mut index = start;
    while index < args.len() {
        let flag = args[index].as_str();
        match flag {
            "--image" => {
                index += 1;
                image = Some(PathBuf::from(value(args, index, flag)?));
            }
            "--owner" => {
                index += 1;
                owner_id = Some(parse_number(value(args, index, flag)?, flag)?);
            }
            "--id" => {
                index += 1;
                item_id = Some(parse_number(value(args, index, flag)?, flag)?);
            }
            "--category" => {
                index += 1;
                let raw = value(args, index, flag)?;
                fields.category = Some(
                    ClothingCategory::parse(raw)
                        .ok_or_else(|| anyhow!("Unknown clothing category: {raw}"))?,
                );
            }
            "--name" => {
                index += 1;
                fields.name = Some(value(args, index, flag)?.to_string());
            }
            "--color" => {
                index += 1;
                fields.color = Some(value(args, index, flag)?.to_string());
            }
            "--description" => {
                index += 1;
                fields.description = Some(value(args, index, flag)?.to_string());
            }
            "--brand" => {
                index += 1;
                fields.brand = Some(value(args, index, flag)?.to_string());
            }
            "--threshold" => {
                index += 1;
                threshold = Some(parse_number(value(args, index, flag)?, flag)?);
            }
            "--limit" => {
                index += 1;
                limit = parse_number::<usize>(value(args, index, flag)?, flag)?.max(1);
            }
            "--context" => {
                index += 1;
                suggest.context = value(args, index, flag)?.to_string();
            }
            "--backend" => {
                index += 1;
                suggest.backend = Some(value(args, index, flag)?.to_string());
            }
            "--location" => {
                index += 1;
                suggest.location = Some(value(args, index, flag)?.to_string());
            }
            "--output" => {
                index += 1;
                suggest.output = Some(PathBuf::from(value(args, index, flag)?));
            }
            "--wardrobe-only" => suggest.wardrobe_only = true,
            "--render" => suggest.render = true,
            "--save" => suggest.save = true,
            "--help" | "-h" => return Err(anyhow!(usage())),
            other => {
                return Err(anyhow!("Unknown argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    match command.as_str() {
        "suggest" => {
            suggest.image = image.ok_or_else(|| anyhow!("--image is required"))?;
            suggest.owner_id = owner_id;
            if (suggest.save || suggest.wardrobe_only) && owner_id.is_none() {
                return Err(anyhow!("--save and --wardrobe-only need --owner"));
            }
            Ok(CliCommand::Suggest(suggest))
        }
        "check-duplicate" => Ok(CliCommand::CheckDuplicate(DuplicateArgs {
            image: image.ok_or_else(|| anyhow!("--image is required"))?,
            owner_id: owner_id.ok_or_else(|| anyhow!("--owner is required"))?,
            threshold,
        })),
        "history" => Ok(CliCommand::History(HistoryArgs {
            owner_id: owner_id.ok_or_else(|| anyhow!("--owner is required"))?,
            limit,
        })),
        "wardrobe" => {
            let owner_id = owner_id.ok_or_else(|| anyhow!("--owner is required"))?;
            fields.image = image;
            let action = match action {
                Some("add") => {
                    if fields.category.is_none() || fields.name.is_none() {
                        return Err(anyhow!("wardrobe add needs --category and --name"));
                    }
                    WardrobeAction::Add { owner_id, fields }
                }
                Some("update") => WardrobeAction::Update {
                    owner_id,
                    item_id: item_id.ok_or_else(|| anyhow!("--id is required"))?,
                    fields,
                },
                Some("list") => WardrobeAction::List {
                    owner_id,
                    category: fields.category,
                },
                Some("delete") => WardrobeAction::Delete {
                    owner_id,
                    item_id: item_id.ok_or_else(|| anyhow!("--id is required"))?,
                },
                other => {
                    return Err(anyhow!(
                        "Unknown wardrobe action: {}\n{}",
                        other.unwrap_or("<none>"),
                        usage()
                    ))
                }
            };
            Ok(CliCommand::Wardrobe(action))
        }
        other => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

/// Reads and validates a garment photo.
async fn read_garment_image(state: &AppState, path: &Path) -> anyhow::Result<Vec<u8>> {
    let bytes = tokio::fs::read(path).await?;
    validate_upload(&bytes, state.config.max_image_size_mb)?;
    Ok(bytes)
}

fn apply_fields(item: &mut WardrobeItem, fields: WardrobeFields) {
    if let Some(category) = fields.category {
        item.category = category;
    }
    if let Some(name) = fields.name {
        item.name = name;
    }
    if let Some(color) = fields.color {
        item.color = color;
    }
    if let Some(description) = fields.description {
        item.description = description;
    }
    if let Some(brand) = fields.brand {
        item.brand = brand;
    }
}

async fn run_wardrobe(state: &AppState, action: WardrobeAction) -> anyhow::Result<()> {
    let report = match action {
        WardrobeAction::Add { owner_id, fields } => {
            let image = match &fields.image {
                Some(path) => Some(read_garment_image(state, path).await?),
                None => None,
            };
            let mut item = WardrobeItem::new(
                owner_id,
                fields.category.unwrap_or(ClothingCategory::Other),
                "",
                "",
            );
            apply_fields(&mut item, fields);
            item.image = image;
            let id = state.db.add_wardrobe_item(&item).await?;
            info!("Added wardrobe item {id} for owner {owner_id}");
            json!({ "id": id })
        }
        WardrobeAction::Update {
            owner_id,
            item_id,
            fields,
        } => {
            let mut item = state
                .db
                .get_wardrobe_item(owner_id, item_id)
                .await?
                .ok_or_else(|| anyhow!("Wardrobe item {item_id} not found"))?;
            if let Some(path) = &fields.image {
                item.image = Some(read_garment_image(state, path).await?);
            }
            apply_fields(&mut item, fields);
            let updated = state.db.update_wardrobe_item(owner_id, &item).await?;
            json!({ "id": item_id, "updated": updated })
        }
        WardrobeAction::List { owner_id, category } => {
            let items = state.db.list_wardrobe(owner_id, category).await?;
            json!(items
                .into_iter()
                .map(|item| json!({
                    "id": item.id,
                    "category": item.category,
                    "name": item.name,
                    "color": item.color,
                    "description": item.description,
                    "brand": item.brand,
                    "has_image": item.image.is_some(),
                }))
                .collect::<Vec<_>>())
        }
        WardrobeAction::Delete { owner_id, item_id } => {
            let deleted = state.db.delete_wardrobe_item(owner_id, item_id).await?;
            json!({ "id": item_id, "deleted": deleted })
        }
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_suggest(state: &AppState, args: SuggestArgs) -> anyhow::Result<()> {
    let image = tokio::fs::read(&args.image).await?;
    let mut request = SuggestionRequest::new(image.clone(), args.context.clone());
    request.wardrobe.owned_only = args.wardrobe_only;
    if args.render {
        request.render = Some(RenderOptions {
            backend: args
                .backend
                .clone()
                .unwrap_or_else(|| state.config.default_image_backend.clone()),
            location: args.location.clone(),
        });
    }

    let outcome = match args.owner_id {
        Some(owner_id) => {
            state
                .pipeline
                .suggest_for_owner(&state.db, owner_id, request)
                .await?
        }
        None => state.pipeline.build_suggestion(request).await?,
    };

    let mut history_id = None;
    if let (true, Some(owner_id)) = (args.save, args.owner_id) {
        let id = state
            .db
            .save_history(owner_id, &args.context, Some(&image), &outcome.suggestion)
            .await?;
        info!("Saved suggestion {id} for owner {owner_id}");
        history_id = Some(id);
    }

    if let (Some(path), Some(model_image)) = (&args.output, &outcome.suggestion.model_image) {
        tokio::fs::write(path, model_image).await?;
        info!("Model image written to {}", path.display());
    }

    let report = json!({
        "suggestion": outcome.suggestion,
        "image_backend": outcome.image_backend,
        "degradations": outcome.degradations,
        "history_id": history_id,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_check_duplicate(state: &AppState, args: DuplicateArgs) -> anyhow::Result<()> {
    let image = tokio::fs::read(&args.image).await?;
    let history = state
        .pipeline
        .check_duplicate(&state.db, args.owner_id, &image, DUPLICATE_SCAN_LIMIT)
        .await?;
    let garment = state
        .pipeline
        .check_wardrobe_duplicate(&state.db, args.owner_id, &image, None)
        .await?;

    let report = json!({
        "threshold": state.config.image_similarity_threshold,
        "history_match": history.map(|entry| json!({
            "id": entry.id,
            "text_input": entry.text_input,
            "created_at": entry.created_at,
            "suggestion": entry.suggestion,
        })),
        "wardrobe_match": garment,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_history(state: &AppState, args: HistoryArgs) -> anyhow::Result<()> {
    let entries = state.db.list_history(args.owner_id, args.limit).await?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args)?;

    let mut config = Config::load()?;
    if let CliCommand::CheckDuplicate(DuplicateArgs {
        threshold: Some(threshold),
        ..
    }) = &command
    {
        config.image_similarity_threshold = *threshold;
    }
    let _guards = init_logging(&config);
    info!("Starting outfit_suggestor");

    let state = AppState::init(Arc::new(config)).await?;
    let result = match command {
        CliCommand::Suggest(args) => run_suggest(&state, args).await,
        CliCommand::CheckDuplicate(args) => run_check_duplicate(&state, args).await,
        CliCommand::History(args) => run_history(&state, args).await,
        CliCommand::Wardrobe(action) => run_wardrobe(&state, action).await,
    };
    if let Err(err) = &result {
        error!("Command failed: {err}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        std::iter::once("outfit_suggestor")
            .chain(raw.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_suggest_flags() {
        let command = parse_args(&args(&[
            "suggest",
            "--image",
            "shirt.jpg",
            "--context",
            "business casual",
            "--owner",
            "7",
            "--render",
            "--backend",
            "nano-banana",
            "--save",
        ]))
        .unwrap();
        let CliCommand::Suggest(suggest) = command else {
            panic!("expected suggest");
        };
        assert_eq!(suggest.image, PathBuf::from("shirt.jpg"));
        assert_eq!(suggest.context, "business casual");
        assert_eq!(suggest.owner_id, Some(7));
        assert!(suggest.render && suggest.save);
        assert_eq!(suggest.backend.as_deref(), Some("nano-banana"));
    }

    #[test]
    fn rejects_incomplete_commands() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["suggest"])).is_err());
        assert!(parse_args(&args(&["suggest", "--image", "a.jpg", "--save"])).is_err());
        assert!(parse_args(&args(&["history", "--owner", "abc"])).is_err());
        assert!(parse_args(&args(&["dance"])).is_err());
    }

    #[test]
    fn parses_wardrobe_actions() {
        assert_eq!(
            parse_args(&args(&[
                "wardrobe", "add", "--owner", "7", "--category", "blazer", "--name",
                "Navy hopsack", "--color", "Navy Blue", "--image", "blazer.jpg",
            ]))
            .unwrap(),
            CliCommand::Wardrobe(WardrobeAction::Add {
                owner_id: 7,
                fields: WardrobeFields {
                    category: Some(ClothingCategory::Blazer),
                    name: Some("Navy hopsack".to_string()),
                    color: Some("Navy Blue".to_string()),
                    image: Some(PathBuf::from("blazer.jpg")),
                    ..WardrobeFields::default()
                },
            })
        );
        assert_eq!(
            parse_args(&args(&["wardrobe", "update", "--owner", "7", "--id", "3", "--brand", "Drake's"])).unwrap(),
            CliCommand::Wardrobe(WardrobeAction::Update {
                owner_id: 7,
                item_id: 3,
                fields: WardrobeFields {
                    brand: Some("Drake's".to_string()),
                    ..WardrobeFields::default()
                },
            })
        );
        assert_eq!(
            parse_args(&args(&["wardrobe", "list", "--owner", "7", "--category", "shoes"])).unwrap(),
            CliCommand::Wardrobe(WardrobeAction::List {
                owner_id: 7,
                category: Some(ClothingCategory::Shoes),
            })
        );
    }

    #[test]
    fn rejects_incomplete_wardrobe_actions() {
        assert!(parse_args(&args(&["wardrobe", "add", "--owner", "7", "--name", "Tee"])).is_err());
        assert!(parse_args(&args(&["wardrobe", "add", "--owner", "7", "--category", "cape", "--name", "x"])).is_err());
        assert!(parse_args(&args(&["wardrobe", "delete", "--owner", "7"])).is_err());
        assert!(parse_args(&args(&["wardrobe", "--owner", "7"])).is_err());
        assert!(parse_args(&args(&["wardrobe", "list"])).is_err());
    }

    #[test]
    fn parses_duplicate_and_history() {
        assert_eq!(
            parse_args(&args(&["check-duplicate", "--image", "a.png", "--owner", "3", "--threshold", "0"])).unwrap(),
            CliCommand::CheckDuplicate(DuplicateArgs {
                image: PathBuf::from("a.png"),
                owner_id: 3,
                threshold: Some(0),
            })
        );
        assert_eq!(
            parse_args(&args(&["history", "--owner", "3"])).unwrap(),
            CliCommand::History(HistoryArgs {
                owner_id: 3,
                limit: DEFAULT_HISTORY_LIMIT,
            })
        );
    }
}
