use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{from_json, new_id, require, to_json, CatalogStore, PromptItem};
use crate::core::errors::ApiError;

const PROMPT_COLUMNS: &str = "id, name, description, prompt_template_text, prompt_template_type, \
     extended_properties_json, system";

fn row_to_prompt(row: &SqliteRow) -> PromptItem {
    let extended: String = row.get("extended_properties_json");
    PromptItem {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        prompt_template_text: row.get("prompt_template_text"),
        prompt_template_type: row.get("prompt_template_type"),
        extended_properties: from_json::<Value>(&extended),
        system: row.get::<i64, _>("system") != 0,
    }
}

impl CatalogStore {
    pub async fn get_prompt(&self, id: &str) -> Result<Option<PromptItem>, ApiError> {
        let row = sqlx::query(&format!("SELECT {} FROM PromptItems WHERE id = ?1", PROMPT_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(row_to_prompt))
    }

    pub async fn get_prompt_by_name(&self, name: &str) -> Result<Option<PromptItem>, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM PromptItems WHERE name = ?1",
            PROMPT_COLUMNS
        ))
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(row_to_prompt))
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptItem>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM PromptItems ORDER BY system DESC, name",
            PROMPT_COLUMNS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(rows.iter().map(row_to_prompt).collect())
    }

    pub async fn upsert_prompt(&self, mut prompt: PromptItem) -> Result<PromptItem, ApiError> {
        require("name", &prompt.name)?;
        if prompt.id.trim().is_empty() {
            prompt.id = match self.get_prompt_by_name(&prompt.name).await? {
                Some(existing) => existing.id,
                None => new_id(),
            };
        }

        sqlx::query(
            "INSERT INTO PromptItems
                (id, name, description, prompt_template_text, prompt_template_type,
                 extended_properties_json, system)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                prompt_template_text = excluded.prompt_template_text,
                prompt_template_type = excluded.prompt_template_type,
                extended_properties_json = excluded.extended_properties_json,
                system = excluded.system",
        )
        .bind(&prompt.id)
        .bind(&prompt.name)
        .bind(&prompt.description)
        .bind(&prompt.prompt_template_text)
        .bind(&prompt.prompt_template_type)
        .bind(to_json(&prompt.extended_properties)?)
        .bind(prompt.system as i64)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(prompt)
    }

    /// System prompts are part of the seeded library and cannot be deleted.
    pub async fn delete_prompt(&self, id: &str) -> Result<u64, ApiError> {
        if let Some(prompt) = self.get_prompt(id).await? {
            if prompt.system {
                return Err(ApiError::Forbidden(format!(
                    "system prompt '{}' cannot be deleted",
                    prompt.name
                )));
            }
        }
        let result = sqlx::query("DELETE FROM PromptItems WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }
}
