use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{from_json, new_id, require, to_json, CatalogStore, Folder};
use crate::core::errors::ApiError;

const DEFAULT_FOLDER_TYPE: &str = "default";
const MAX_FOLDER_DEPTH: usize = 256;

const FOLDER_COLUMNS: &str =
    "id, parent_id, folder_name, folder_type, description, is_root, extended_properties_json";

fn row_to_folder(row: &SqliteRow) -> Folder {
    let extended: String = row.get("extended_properties_json");
    Folder {
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        folder_name: row.get("folder_name"),
        folder_type: row.get("folder_type"),
        description: row.get("description"),
        is_root: row.get::<i64, _>("is_root") != 0,
        extended_properties: from_json::<Value>(&extended),
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

impl CatalogStore {
    pub async fn get_folder(&self, id: &str) -> Result<Option<Folder>, ApiError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ContentFoldersCatalog WHERE id = ?1",
            FOLDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(row_to_folder))
    }

    async fn find_child(
        &self,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Folder>, ApiError> {
        let row = match parent_id {
            Some(parent) => {
                sqlx::query(&format!(
                    "SELECT {} FROM ContentFoldersCatalog WHERE parent_id = ?1 AND folder_name = ?2",
                    FOLDER_COLUMNS
                ))
                .bind(parent)
                .bind(name)
                .fetch_optional(self.pool())
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM ContentFoldersCatalog WHERE parent_id IS NULL AND folder_name = ?1",
                    FOLDER_COLUMNS
                ))
                .bind(name)
                .fetch_optional(self.pool())
                .await
            }
        }
        .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(row_to_folder))
    }

    /// Resolves `a/b/c` from a root. With `create`, missing folders are created and
    /// inherit `folder_type` from the nearest existing ancestor.
    pub async fn get_folder_by_path(
        &self,
        path: &str,
        create: bool,
    ) -> Result<Option<Folder>, ApiError> {
        let segments = split_path(path);
        if segments.is_empty() {
            return Err(ApiError::InvalidArgument("folder path is empty".to_string()));
        }

        let mut current: Option<Folder> = None;
        for segment in segments {
            let parent_id = current.as_ref().map(|f| f.id.as_str());
            let next = match self.find_child(parent_id, segment).await? {
                Some(folder) => folder,
                None if create => {
                    let folder = Folder {
                        id: new_id(),
                        parent_id: parent_id.map(str::to_string),
                        folder_name: segment.to_string(),
                        folder_type: current
                            .as_ref()
                            .map(|f| f.folder_type.clone())
                            .unwrap_or_else(|| DEFAULT_FOLDER_TYPE.to_string()),
                        description: String::new(),
                        is_root: parent_id.is_none(),
                        extended_properties: Value::Object(Default::default()),
                    };
                    self.insert_folder_row(&folder).await?;
                    folder
                }
                None => return Ok(None),
            };
            current = Some(next);
        }

        Ok(current)
    }

    pub async fn get_folder_path(&self, id: &str) -> Result<Option<String>, ApiError> {
        let mut names = Vec::new();
        let mut next = Some(id.to_string());

        while let Some(folder_id) = next {
            if names.len() >= MAX_FOLDER_DEPTH {
                return Err(ApiError::Internal(format!(
                    "folder hierarchy above {} is cyclic or too deep",
                    id
                )));
            }
            let Some(folder) = self.get_folder(&folder_id).await? else {
                if names.is_empty() {
                    return Ok(None);
                }
                return Err(ApiError::NotFound(format!("parent folder {}", folder_id)));
            };
            names.push(folder.folder_name);
            next = folder.parent_id;
        }

        names.reverse();
        Ok(Some(names.join("/")))
    }

    /// Children of `parent_id`, or root folders when `None`.
    pub async fn list_folders(&self, parent_id: Option<&str>) -> Result<Vec<Folder>, ApiError> {
        let rows = match parent_id {
            Some(parent) => {
                sqlx::query(&format!(
                    "SELECT {} FROM ContentFoldersCatalog WHERE parent_id = ?1 ORDER BY folder_name",
                    FOLDER_COLUMNS
                ))
                .bind(parent)
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM ContentFoldersCatalog WHERE parent_id IS NULL ORDER BY folder_name",
                    FOLDER_COLUMNS
                ))
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(ApiError::internal)?;
        Ok(rows.iter().map(row_to_folder).collect())
    }

    pub async fn upsert_folder(&self, mut folder: Folder) -> Result<Folder, ApiError> {
        require("folder_name", &folder.folder_name)?;
        if folder.folder_name.contains('/') {
            return Err(ApiError::InvalidArgument(
                "folder_name must not contain '/'".to_string(),
            ));
        }

        match folder.parent_id.as_deref() {
            None if !folder.is_root => {
                return Err(ApiError::InvalidArgument(
                    "a folder without parent_id must be a root (is_root=true)".to_string(),
                ));
            }
            Some(_) if folder.is_root => {
                return Err(ApiError::InvalidArgument(
                    "a root folder must not have a parent_id".to_string(),
                ));
            }
            Some(parent) => {
                if self.get_folder(parent).await?.is_none() {
                    return Err(ApiError::NotFound(format!("parent folder {}", parent)));
                }
            }
            None => {}
        }

        if folder.id.trim().is_empty() {
            folder.id = new_id();
        }
        if folder.folder_type.trim().is_empty() {
            folder.folder_type = DEFAULT_FOLDER_TYPE.to_string();
        }

        if let Some(sibling) = self
            .find_child(folder.parent_id.as_deref(), &folder.folder_name)
            .await?
        {
            if sibling.id != folder.id {
                return Err(ApiError::InvalidArgument(format!(
                    "a sibling folder named '{}' already exists",
                    folder.folder_name
                )));
            }
        }

        self.insert_folder_row(&folder).await?;
        Ok(folder)
    }

    async fn insert_folder_row(&self, folder: &Folder) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO ContentFoldersCatalog
                (id, parent_id, folder_name, folder_type, description, is_root, extended_properties_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                parent_id = excluded.parent_id,
                folder_name = excluded.folder_name,
                folder_type = excluded.folder_type,
                description = excluded.description,
                is_root = excluded.is_root,
                extended_properties_json = excluded.extended_properties_json",
        )
        .bind(&folder.id)
        .bind(&folder.parent_id)
        .bind(&folder.folder_name)
        .bind(&folder.folder_type)
        .bind(&folder.description)
        .bind(folder.is_root as i64)
        .bind(to_json(&folder.extended_properties)?)
        .execute(self.pool())
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    /// Deletes the folder, its descendants and their content items.
    /// Returns the ids of every deleted folder.
    pub async fn delete_folder(&self, id: &str) -> Result<Vec<String>, ApiError> {
        let mut tx = self.pool().begin().await.map_err(ApiError::internal)?;

        let ids: Vec<String> = sqlx::query_scalar(
            "WITH RECURSIVE tree(id) AS (
                SELECT id FROM ContentFoldersCatalog WHERE id = ?1
                UNION
                SELECT c.id FROM ContentFoldersCatalog c JOIN tree t ON c.parent_id = t.id
             )
             SELECT id FROM tree",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        for folder_id in &ids {
            sqlx::query("DELETE FROM ContentItems WHERE folder_id = ?1")
                .bind(folder_id)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;
            sqlx::query("DELETE FROM ContentFoldersCatalog WHERE id = ?1")
                .bind(folder_id)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::open_temp;

    #[tokio::test]
    async fn path_round_trip() {
        let (_dir, store) = open_temp().await;

        let created = store
            .get_folder_by_path("a/b/c", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            store.get_folder_path(&created.id).await.unwrap().as_deref(),
            Some("a/b/c")
        );

        let again = store
            .get_folder_by_path("/a/b/c/", false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, created.id);
        assert!(store.get_folder_by_path("a/x", false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn created_folders_inherit_type() {
        let (_dir, store) = open_temp().await;
        let root = store
            .upsert_folder(Folder {
                id: String::new(),
                parent_id: None,
                folder_name: "notes".into(),
                folder_type: "clipboard".into(),
                description: String::new(),
                is_root: true,
                extended_properties: Value::Null,
            })
            .await
            .unwrap();

        let leaf = store
            .get_folder_by_path("notes/2024/q1", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leaf.folder_type, "clipboard");
        assert!(!leaf.is_root);
        assert_eq!(store.list_folders(Some(&root.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn root_rules_and_sibling_uniqueness() {
        let (_dir, store) = open_temp().await;
        let orphan = Folder {
            id: String::new(),
            parent_id: None,
            folder_name: "loose".into(),
            folder_type: "default".into(),
            description: String::new(),
            is_root: false,
            extended_properties: Value::Null,
        };
        assert!(matches!(
            store.upsert_folder(orphan).await,
            Err(ApiError::InvalidArgument(_))
        ));

        let parent = store.get_folder_by_path("kb", true).await.unwrap().unwrap();
        store.get_folder_by_path("kb/a", true).await.unwrap();
        let duplicate = Folder {
            id: String::new(),
            parent_id: Some(parent.id),
            folder_name: "a".into(),
            folder_type: "default".into(),
            description: String::new(),
            is_root: false,
            extended_properties: Value::Null,
        };
        assert!(matches!(
            store.upsert_folder(duplicate).await,
            Err(ApiError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_recursive() {
        let (_dir, store) = open_temp().await;
        let top = store.get_folder_by_path("x", true).await.unwrap().unwrap();
        store.get_folder_by_path("x/y/z", true).await.unwrap();
        let other = store.get_folder_by_path("w", true).await.unwrap().unwrap();

        let deleted = store.delete_folder(&top.id).await.unwrap();
        assert_eq!(deleted.len(), 3);
        assert!(store.get_folder_by_path("x/y", false).await.unwrap().is_none());
        assert!(store.get_folder(&other.id).await.unwrap().is_some());
        assert!(store.delete_folder("missing").await.unwrap().is_empty());
    }
}
