use serde_json::Value;
use sqlx::Row;

use super::{
    from_json, new_id, require, to_json, AutoProcessItem, AutoProcessRule, CatalogStore,
    SearchRule,
};
use crate::core::errors::ApiError;

impl CatalogStore {
    pub async fn list_auto_process_items(&self) -> Result<Vec<AutoProcessItem>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, name, description, item_type, action_type, extended_properties_json
             FROM AutoProcessItems ORDER BY name",
        )
        .fetch_all(self.pool())
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| {
                let extended: String = row.get("extended_properties_json");
                AutoProcessItem {
                    id: row.get("id"),
                    name: row.get("name"),
                    description: row.get("description"),
                    item_type: row.get("item_type"),
                    action_type: row.get("action_type"),
                    extended_properties: from_json::<Value>(&extended),
                }
            })
            .collect())
    }

    pub async fn upsert_auto_process_item(
        &self,
        mut item: AutoProcessItem,
    ) -> Result<AutoProcessItem, ApiError> {
        require("name", &item.name)?;
        if item.id.trim().is_empty() {
            item.id = new_id();
        }
        sqlx::query(
            "INSERT INTO AutoProcessItems
                (id, name, description, item_type, action_type, extended_properties_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                item_type = excluded.item_type,
                action_type = excluded.action_type,
                extended_properties_json = excluded.extended_properties_json",
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.item_type)
        .bind(&item.action_type)
        .bind(to_json(&item.extended_properties)?)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(item)
    }

    pub async fn delete_auto_process_item(&self, id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM AutoProcessItems WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }

    /// Rules in evaluation order (ascending priority).
    pub async fn list_auto_process_rules(&self) -> Result<Vec<AutoProcessRule>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, name, description, priority, is_enabled, target_folder_id,
                    auto_process_item_id, destination_folder_id, conditions_json
             FROM auto_process_rules ORDER BY priority, name",
        )
        .fetch_all(self.pool())
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| {
                let conditions: String = row.get("conditions_json");
                AutoProcessRule {
                    id: row.get("id"),
                    name: row.get("name"),
                    description: row.get("description"),
                    priority: row.get("priority"),
                    enabled: row.get::<i64, _>("is_enabled") != 0,
                    target_folder_id: row.get("target_folder_id"),
                    auto_process_item_id: row.get("auto_process_item_id"),
                    destination_folder_id: row.get("destination_folder_id"),
                    conditions: from_json(&conditions),
                }
            })
            .collect())
    }

    pub async fn upsert_auto_process_rule(
        &self,
        mut rule: AutoProcessRule,
    ) -> Result<AutoProcessRule, ApiError> {
        require("name", &rule.name)?;
        if rule.id.trim().is_empty() {
            rule.id = new_id();
        }
        sqlx::query(
            "INSERT INTO auto_process_rules
                (id, name, description, priority, is_enabled, target_folder_id,
                 auto_process_item_id, destination_folder_id, conditions_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                priority = excluded.priority,
                is_enabled = excluded.is_enabled,
                target_folder_id = excluded.target_folder_id,
                auto_process_item_id = excluded.auto_process_item_id,
                destination_folder_id = excluded.destination_folder_id,
                conditions_json = excluded.conditions_json",
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.priority)
        .bind(rule.enabled as i64)
        .bind(&rule.target_folder_id)
        .bind(&rule.auto_process_item_id)
        .bind(&rule.destination_folder_id)
        .bind(to_json(&rule.conditions)?)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(rule)
    }

    pub async fn delete_auto_process_rule(&self, id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM auto_process_rules WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }

    pub async fn list_search_rules(&self) -> Result<Vec<SearchRule>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, name, search_text, search_condition_json FROM SearchRules ORDER BY name",
        )
        .fetch_all(self.pool())
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| {
                let condition: String = row.get("search_condition_json");
                SearchRule {
                    id: row.get("id"),
                    name: row.get("name"),
                    search_text: row.get("search_text"),
                    search_condition: from_json::<Value>(&condition),
                }
            })
            .collect())
    }

    pub async fn upsert_search_rule(&self, mut rule: SearchRule) -> Result<SearchRule, ApiError> {
        require("name", &rule.name)?;
        if rule.id.trim().is_empty() {
            rule.id = new_id();
        }
        sqlx::query(
            "INSERT INTO SearchRules (id, name, search_text, search_condition_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                search_text = excluded.search_text,
                search_condition_json = excluded.search_condition_json",
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(&rule.search_text)
        .bind(to_json(&rule.search_condition)?)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(rule)
    }

    pub async fn delete_search_rule(&self, id: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM SearchRules WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::open_temp;
    use serde_json::json;

    #[tokio::test]
    async fn rules_are_listed_by_priority() {
        let (_dir, store) = open_temp().await;
        for (name, priority) in [("late", 10), ("early", 1)] {
            store
                .upsert_auto_process_rule(AutoProcessRule {
                    id: String::new(),
                    name: name.into(),
                    description: String::new(),
                    priority,
                    enabled: true,
                    target_folder_id: None,
                    auto_process_item_id: None,
                    destination_folder_id: None,
                    conditions: vec![json!({"kind": "description_contains", "value": "x"})],
                })
                .await
                .unwrap();
        }

        let names: Vec<String> = store
            .list_auto_process_rules()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["early", "late"]);
    }
}
