use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{from_json, new_id, require, to_json, CatalogStore, ContentItem, Tag};
use crate::core::errors::ApiError;

const CONTENT_COLUMNS: &str = "id, folder_id, created_at, updated_at, content, description, \
     content_type, tags_json, pinned, extended_properties_json";

fn row_to_item(row: &SqliteRow) -> ContentItem {
    let tags: String = row.get("tags_json");
    let extended: String = row.get("extended_properties_json");
    ContentItem {
        id: row.get("id"),
        folder_id: row.get("folder_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        content: row.get("content"),
        description: row.get("description"),
        content_type: row.get("content_type"),
        tags: from_json(&tags),
        pinned: row.get::<i64, _>("pinned") != 0,
        extended_properties: from_json::<Value>(&extended),
    }
}

fn row_to_tag(row: &SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        tag: row.get("tag"),
        is_pinned: row.get::<i64, _>("is_pinned") != 0,
    }
}

impl CatalogStore {
    pub async fn get_content_item(&self, id: &str) -> Result<Option<ContentItem>, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ContentItems WHERE id = ?1",
            CONTENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(row_to_item))
    }

    pub async fn list_content_items(&self, folder_id: &str) -> Result<Vec<ContentItem>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ContentItems WHERE folder_id = ?1 ORDER BY pinned DESC, updated_at DESC",
            CONTENT_COLUMNS
        ))
        .bind(folder_id)
        .fetch_all(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(rows.iter().map(row_to_item).collect())
    }

    /// Inserts or replaces by id. `created_at` survives updates; tags are registered.
    pub async fn upsert_content_item(
        &self,
        mut item: ContentItem,
    ) -> Result<ContentItem, ApiError> {
        require("folder_id", &item.folder_id)?;
        if item.id.trim().is_empty() {
            item.id = new_id();
        }
        let now = Utc::now().to_rfc3339();
        if item.created_at.is_empty() {
            item.created_at = now.clone();
        }
        item.updated_at = now;

        let mut tx = self.pool().begin().await.map_err(ApiError::internal)?;
        sqlx::query(
            "INSERT INTO ContentItems
                (id, folder_id, created_at, updated_at, content, description, content_type,
                 tags_json, pinned, extended_properties_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                folder_id = excluded.folder_id,
                updated_at = excluded.updated_at,
                content = excluded.content,
                description = excluded.description,
                content_type = excluded.content_type,
                tags_json = excluded.tags_json,
                pinned = excluded.pinned,
                extended_properties_json = excluded.extended_properties_json",
        )
        .bind(&item.id)
        .bind(&item.folder_id)
        .bind(&item.created_at)
        .bind(&item.updated_at)
        .bind(&item.content)
        .bind(&item.description)
        .bind(&item.content_type)
        .bind(to_json(&item.tags)?)
        .bind(item.pinned as i64)
        .bind(to_json(&item.extended_properties)?)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        for tag in item.tags.iter().filter(|t| !t.trim().is_empty()) {
            sqlx::query("INSERT OR IGNORE INTO TagItems (id, tag, is_pinned) VALUES (?1, ?2, 0)")
                .bind(new_id())
                .bind(tag)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(item)
    }

    pub async fn delete_content_item(&self, id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM ContentItems WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>, ApiError> {
        let rows = sqlx::query("SELECT id, tag, is_pinned FROM TagItems ORDER BY is_pinned DESC, tag")
            .fetch_all(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(rows.iter().map(row_to_tag).collect())
    }

    pub async fn upsert_tag(&self, mut tag: Tag) -> Result<Tag, ApiError> {
        require("tag", &tag.tag)?;
        if tag.id.trim().is_empty() {
            let existing: Option<String> =
                sqlx::query_scalar("SELECT id FROM TagItems WHERE tag = ?1")
                    .bind(&tag.tag)
                    .fetch_optional(self.pool())
                    .await
                    .map_err(ApiError::internal)?;
            tag.id = existing.unwrap_or_else(new_id);
        }

        sqlx::query(
            "INSERT INTO TagItems (id, tag, is_pinned) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET tag = excluded.tag, is_pinned = excluded.is_pinned",
        )
        .bind(&tag.id)
        .bind(&tag.tag)
        .bind(tag.is_pinned as i64)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(tag)
    }

    pub async fn delete_tag(&self, id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM TagItems WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }
}
