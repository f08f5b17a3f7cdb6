use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::ApiError;

pub const APP_DATA_PATH_ENV: &str = "APP_DATA_PATH";

/// Filesystem layout rooted at `APP_DATA_PATH`.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub app_data_dir: PathBuf,
    pub server_dir: PathBuf,
    pub main_db_path: PathBuf,
    pub vector_db_dir: PathBuf,
    pub log_dir: PathBuf,
    pub work_dir: PathBuf,
    pub settings_path: PathBuf,
}

impl AppPaths {
    pub fn from_env() -> Result<Self, ApiError> {
        let root = env::var(APP_DATA_PATH_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ApiError::FatalConfig(format!("{} is not set", APP_DATA_PATH_ENV)))?;
        Ok(Self::with_root(root))
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let app_data_dir = root.into();
        let server_dir = app_data_dir.join("server");
        let main_db_dir = server_dir.join("main_db");
        let main_db_path = main_db_dir.join("server_main.db");
        let vector_db_dir = server_dir.join("vector_db");
        let log_dir = server_dir.join("log");
        let work_dir = server_dir.join("work");
        let settings_path = server_dir.join("config.yml");

        for dir in [&main_db_dir, &vector_db_dir, &log_dir, &work_dir] {
            if let Err(err) = fs::create_dir_all(dir) {
                tracing::warn!("Failed to create {}: {}", dir.display(), err);
            }
        }

        AppPaths {
            app_data_dir,
            server_dir,
            main_db_path,
            vector_db_dir,
            log_dir,
            work_dir,
            settings_path,
        }
    }

    /// Resolves a descriptor storage URL. Relative paths live under the vector_db dir.
    pub fn resolve_storage(&self, storage_url: &str) -> PathBuf {
        let trimmed = storage_url
            .strip_prefix("sqlite://")
            .or_else(|| storage_url.strip_prefix("file://"))
            .unwrap_or(storage_url);
        let candidate = Path::new(trimmed);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.vector_db_dir.join(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_app_data_root() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_root(tmp.path());

        assert_eq!(
            paths.main_db_path,
            tmp.path().join("server").join("main_db").join("server_main.db")
        );
        assert!(paths.vector_db_dir.is_dir());
        assert!(paths.log_dir.is_dir());
    }

    #[test]
    fn storage_urls_resolve_relative_to_vector_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_root(tmp.path());

        assert_eq!(
            paths.resolve_storage("default/vectors.db"),
            paths.vector_db_dir.join("default/vectors.db")
        );
        let absolute = tmp.path().join("elsewhere.db");
        let url = format!("sqlite://{}", absolute.display());
        assert_eq!(paths.resolve_storage(&url), absolute);
    }
}
