use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{
    from_json, require, to_json, AgentDefinition, ApiKind, CatalogStore, GroupChatDefinition,
    LlmConfig, ToolDefinition,
};
use crate::core::errors::ApiError;

fn row_to_llm_config(row: &SqliteRow) -> LlmConfig {
    let api_type: String = row.get("api_type");
    LlmConfig {
        name: row.get("name"),
        api_kind: ApiKind::parse(&api_type),
        api_version: row.get("api_version"),
        model: row.get("model"),
        api_key: row.get("api_key"),
        base_url: row.get("base_url"),
    }
}

fn row_to_agent(row: &SqliteRow) -> AgentDefinition {
    let tool_names: String = row.get("tool_names_json");
    let vector_db_items: String = row.get("vector_db_items_json");
    AgentDefinition {
        name: row.get("name"),
        description: row.get("description"),
        system_message: row.get("system_message"),
        code_execution: row.get::<i64, _>("code_execution") != 0,
        llm_config_name: row.get("llm_config_name"),
        tool_names: from_json(&tool_names),
        vector_db_items: from_json(&vector_db_items),
    }
}

fn row_to_group_chat(row: &SqliteRow) -> GroupChatDefinition {
    let agent_names: String = row.get("agent_names_json");
    GroupChatDefinition {
        name: row.get("name"),
        description: row.get("description"),
        llm_config_name: row.get("llm_config_name"),
        agent_names: from_json(&agent_names),
    }
}

impl CatalogStore {
    pub async fn get_llm_config(&self, name: &str) -> Result<Option<LlmConfig>, ApiError> {
        let row = sqlx::query(
            "SELECT name, api_type, api_version, model, api_key, base_url
             FROM autogen_llm_configs WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(row_to_llm_config))
    }

    pub async fn list_llm_configs(&self) -> Result<Vec<LlmConfig>, ApiError> {
        let rows = sqlx::query(
            "SELECT name, api_type, api_version, model, api_key, base_url
             FROM autogen_llm_configs ORDER BY name",
        )
        .fetch_all(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(rows.iter().map(row_to_llm_config).collect())
    }

    pub async fn upsert_llm_config(&self, config: &LlmConfig) -> Result<(), ApiError> {
        require("name", &config.name)?;
        require("model", &config.model)?;
        sqlx::query(
            "INSERT INTO autogen_llm_configs (name, api_type, api_version, model, api_key, base_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(name) DO UPDATE SET
                api_type = excluded.api_type,
                api_version = excluded.api_version,
                model = excluded.model,
                api_key = excluded.api_key,
                base_url = excluded.base_url",
        )
        .bind(&config.name)
        .bind(config.api_kind.as_str())
        .bind(&config.api_version)
        .bind(&config.model)
        .bind(&config.api_key)
        .bind(&config.base_url)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn delete_llm_config(&self, name: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM autogen_llm_configs WHERE name = ?1")
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }

    pub async fn get_tool(&self, name: &str) -> Result<Option<ToolDefinition>, ApiError> {
        let row = sqlx::query("SELECT name, description, path FROM autogen_tools WHERE name = ?1")
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(row.map(|row| ToolDefinition {
            name: row.get("name"),
            description: row.get("description"),
            path: row.get("path"),
        }))
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ApiError> {
        let rows = sqlx::query("SELECT name, description, path FROM autogen_tools ORDER BY name")
            .fetch_all(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(rows
            .iter()
            .map(|row| ToolDefinition {
                name: row.get("name"),
                description: row.get("description"),
                path: row.get("path"),
            })
            .collect())
    }

    pub async fn upsert_tool(&self, tool: &ToolDefinition) -> Result<(), ApiError> {
        require("name", &tool.name)?;
        require("path", &tool.path)?;
        sqlx::query(
            "INSERT INTO autogen_tools (name, description, path) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET description = excluded.description, path = excluded.path",
        )
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(&tool.path)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn delete_tool(&self, name: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM autogen_tools WHERE name = ?1")
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }

    pub async fn get_agent(&self, name: &str) -> Result<Option<AgentDefinition>, ApiError> {
        let row = sqlx::query(
            "SELECT name, description, system_message, code_execution, llm_config_name,
                    tool_names_json, vector_db_items_json
             FROM autogen_agents WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(row_to_agent))
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentDefinition>, ApiError> {
        let rows = sqlx::query(
            "SELECT name, description, system_message, code_execution, llm_config_name,
                    tool_names_json, vector_db_items_json
             FROM autogen_agents ORDER BY name",
        )
        .fetch_all(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(rows.iter().map(row_to_agent).collect())
    }

    pub async fn upsert_agent(&self, agent: &AgentDefinition) -> Result<(), ApiError> {
        require("name", &agent.name)?;
        sqlx::query(
            "INSERT INTO autogen_agents
                (name, description, system_message, code_execution, llm_config_name,
                 tool_names_json, vector_db_items_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                system_message = excluded.system_message,
                code_execution = excluded.code_execution,
                llm_config_name = excluded.llm_config_name,
                tool_names_json = excluded.tool_names_json,
                vector_db_items_json = excluded.vector_db_items_json",
        )
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.system_message)
        .bind(agent.code_execution as i64)
        .bind(&agent.llm_config_name)
        .bind(to_json(&agent.tool_names)?)
        .bind(to_json(&agent.vector_db_items)?)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn delete_agent(&self, name: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM autogen_agents WHERE name = ?1")
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected())
    }

    pub async fn get_group_chat(&self, name: &str) -> Result<Option<GroupChatDefinition>, ApiError> {
        let row = sqlx::query(
            "SELECT name, description, llm_config_name, agent_names_json
             FROM autogen_group_chats WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(row_to_group_chat))
    }

    pub async fn list_group_chats(&self) -> Result<Vec<GroupChatDefinition>, ApiError> {
        let rows = sqlx::query(
            "SELECT name, description, llm_config_name, agent_names_json
             FROM autogen_group_chats ORDER BY name",
        )
        .fetch_all(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(rows.iter().map(row_to_group_chat).collect())
    }

    pub async fn upsert_group_chat(&self, group: &GroupChatDefinition) -> Result<(), ApiError> {
        require("name", &group.name)?;
        sqlx::query(
            "INSERT INTO autogen_group_chats (name, description, llm_config_name, agent_names_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                llm_config_name = excluded.llm_config_name,
                agent_names_json = excluded.agent_names_json",
        )
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.llm_config_name)
        .bind(to_json(&group.agent_names)?)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn delete_group_chat(&self, name: &str) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM autogen_group_chats WHERE name = ?1")
            .bind(name)
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
    use crate::catalog::AgentVectorDbItem;

    #[tokio::test]
    async fn agent_list_fields_round_trip_and_upsert_is_idempotent() {
        let (_dir, store) = open_temp().await;
        let agent = AgentDefinition {
            name: "researcher".into(),
            description: "looks things up".into(),
            system_message: "Be precise.".into(),
            code_execution: false,
            llm_config_name: "default".into(),
            tool_names: vec!["fetch".into()],
            vector_db_items: vec![AgentVectorDbItem {
                name: "default".into(),
                description: "knowledge base".into(),
                model: None,
                k: Some(3),
                filter: None,
                score_threshold: None,
            }],
        };

        store.upsert_agent(&agent).await.unwrap();
        store.upsert_agent(&agent).await.unwrap();

        assert_eq!(store.list_agents().await.unwrap().len(), 1);
        assert_eq!(store.get_agent("researcher").await.unwrap(), Some(agent));
    }
}
