use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::models::{HistoryRow, WardrobeRow};
use crate::outfit::pipeline::{GarmentReader, SuggestionHistoryReader};
use crate::outfit::types::{
    group_by_category, normalize_color, ClothingCategory, HistoryEntry, OutfitSuggestion,
    OwnedItems, WardrobeItem,
};

const WARDROBE_COLUMNS: &str =
    "id, owner_id, category, name, color, description, brand, image, created_at";
const HISTORY_COLUMNS: &str =
    "id, owner_id, text_input, image, suggestion_json, model_image, created_at";

/// Owner-scoped storage. Every query filters on `owner_id`.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        // Each in-memory connection is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS wardrobe_items (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                owner_id INTEGER NOT NULL,\
                category TEXT NOT NULL,\
                name TEXT NOT NULL DEFAULT '',\
                color TEXT NOT NULL DEFAULT 'unknown',\
                description TEXT NOT NULL DEFAULT '',\
                brand TEXT NOT NULL DEFAULT '',\
                image BLOB,\
                created_at TEXT NOT NULL,\
                updated_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_wardrobe_owner_category ON wardrobe_items(owner_id, category);",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS outfit_history (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                owner_id INTEGER NOT NULL,\
                text_input TEXT NOT NULL DEFAULT '',\
                image BLOB,\
                suggestion_json TEXT NOT NULL,\
                model_image BLOB,\
                created_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_owner_created ON outfit_history(owner_id, created_at);",
        )
        .execute(&pool)
        .await?;

        info!("Database tables created successfully");
        Ok(Database { pool })
    }

    pub async fn add_wardrobe_item(&self, item: &WardrobeItem) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO wardrobe_items \
                (owner_id, category, name, color, description, brand, image, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.owner_id)
        .bind(item.category.as_str())
        .bind(item.name.trim())
        .bind(normalize_color(&item.color))
        .bind(item.description.trim())
        .bind(item.brand.trim())
        .bind(item.image.as_deref())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();
        debug!("Added wardrobe item {id} for owner {}", item.owner_id);
        Ok(id)
    }

    /// Replaces the editable fields. Returns false when the item is not the owner's.
    pub async fn update_wardrobe_item(&self, owner_id: i64, item: &WardrobeItem) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE wardrobe_items \
             SET category = ?, name = ?, color = ?, description = ?, brand = ?, \
                 image = COALESCE(?, image), updated_at = ? \
             WHERE id = ? AND owner_id = ?",
        )
        .bind(item.category.as_str())
        .bind(item.name.trim())
        .bind(normalize_color(&item.color))
        .bind(item.description.trim())
        .bind(item.brand.trim())
        .bind(item.image.as_deref())
        .bind(Utc::now())
        .bind(item.id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_wardrobe_item(&self, owner_id: i64, item_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wardrobe_items WHERE id = ? AND owner_id = ?")
            .bind(item_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_wardrobe_item(&self, owner_id: i64, item_id: i64) -> Result<Option<WardrobeItem>> {
        let row = sqlx::query_as::<_, WardrobeRow>(&format!(
            "SELECT {WARDROBE_COLUMNS} FROM wardrobe_items WHERE id = ? AND owner_id = ?"
        ))
        .bind(item_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(WardrobeRow::into_item))
    }

    /// Most recently added first.
    pub async fn list_wardrobe(
        &self,
        owner_id: i64,
        category: Option<ClothingCategory>,
    ) -> Result<Vec<WardrobeItem>> {
        let rows = match category {
            Some(category) => {
                sqlx::query_as::<_, WardrobeRow>(&format!(
                    "SELECT {WARDROBE_COLUMNS} FROM wardrobe_items \
                     WHERE owner_id = ? AND category = ? \
                     ORDER BY created_at DESC, id DESC"
                ))
                .bind(owner_id)
                .bind(category.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, WardrobeRow>(&format!(
                    "SELECT {WARDROBE_COLUMNS} FROM wardrobe_items \
                     WHERE owner_id = ? \
                     ORDER BY created_at DESC, id DESC"
                ))
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(WardrobeRow::into_item).collect())
    }

    pub async fn wardrobe_by_category(&self, owner_id: i64) -> Result<OwnedItems> {
        let items = self.list_wardrobe(owner_id, None).await?;
        Ok(group_by_category(&items))
    }

    /// Stores a suggestion with its source photo. The rendered image is kept
    /// in its own column rather than inside the JSON.
    pub async fn save_history(
        &self,
        owner_id: i64,
        text_input: &str,
        image: Option<&[u8]>,
        suggestion: &OutfitSuggestion,
    ) -> Result<i64> {
        let mut stored = suggestion.clone();
        let model_image = stored.model_image.take();
        let suggestion_json = serde_json::to_string(&stored)
            .map_err(|err| anyhow!("failed to serialize suggestion: {err}"))?;

        let result = sqlx::query(
            "INSERT INTO outfit_history \
                (owner_id, text_input, image, suggestion_json, model_image, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(owner_id)
        .bind(text_input)
        .bind(image)
        .bind(suggestion_json)
        .bind(model_image)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Most recent first.
    pub async fn list_history(&self, owner_id: i64, limit: usize) -> Result<Vec<HistoryEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM outfit_history \
             WHERE owner_id = ? \
             ORDER BY created_at DESC, id DESC \
             LIMIT ?"
        ))
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(HistoryRow::into_entry).collect())
    }

    pub async fn delete_history(&self, owner_id: i64, entry_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM outfit_history WHERE id = ? AND owner_id = ?")
            .bind(entry_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl GarmentReader for Database {
    async fn garments(
        &self,
        owner_id: i64,
        category: Option<ClothingCategory>,
    ) -> Result<Vec<WardrobeItem>> {
        self.list_wardrobe(owner_id, category).await
    }

    async fn garment(&self, owner_id: i64, item_id: i64) -> Result<Option<WardrobeItem>> {
        self.get_wardrobe_item(owner_id, item_id).await
    }
}

#[async_trait]
impl SuggestionHistoryReader for Database {
    async fn recent_suggestions(&self, owner_id: i64, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.list_history(owner_id, limit).await
    }
}
