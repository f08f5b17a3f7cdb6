//! Command-line surface: `serve` and `init` run locally, the rest post JSON to a
//! running server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tracing::info;

use crate::catalog::{CatalogStore, SeedDefaults};
use crate::core::config::{AppPaths, EnvConfig};
use crate::core::errors::ApiError;
use crate::core::logging;
use crate::server::router::router;
use crate::state::AppState;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:5100";

#[derive(Debug, Parser)]
#[command(name = "assistant-backend")]
#[command(about = "Retrieval-augmented chat backend and its client commands")]
#[command(version)]
pub struct Cli {
    /// Base URL of a running server
    #[arg(short = 's', long, global = true, default_value = DEFAULT_SERVER)]
    pub server: String,
    /// Application data directory (overrides APP_DATA_PATH)
    #[arg(short = 'd', long = "app-data", global = true)]
    pub app_data: Option<PathBuf>,
    /// Write the JSON result here instead of stdout
    #[arg(short = 'o', long, global = true)]
    pub output: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP/WebSocket server
    Serve,
    /// Create the catalog schema and seed defaults
    Init,
    /// Run one chat turn
    Chat {
        /// JSON request file ({chat_request, chat_request_context, vector_search_requests})
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,
        /// User message appended to the request
        #[arg(short = 'm', long)]
        message: Option<String>,
        /// Retrieve this many documents from the vector database for the message
        #[arg(short = 'k', long)]
        k: Option<usize>,
        /// Restrict retrieval to a folder path
        #[arg(short = 'p', long)]
        folder: Option<String>,
        #[arg(long, env = "VECTOR_DB_NAME", default_value = "default")]
        vector_db: String,
    },
    /// Semantic search
    Search {
        #[arg(short = 'm', long)]
        message: Option<String>,
        /// JSON file with {vector_search_requests}
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,
        #[arg(short = 'k', long)]
        k: Option<usize>,
        #[arg(short = 'p', long)]
        folder: Option<String>,
        #[arg(long, env = "VECTOR_DB_NAME", default_value = "default")]
        vector_db: String,
    },
    /// Index content from an embedding request file
    Ingest {
        #[arg(short = 'f', long)]
        file: PathBuf,
        #[arg(short = 'p', long)]
        folder: Option<String>,
        #[arg(long, env = "VECTOR_DB_NAME", default_value = "default")]
        vector_db: String,
    },
    /// Extract text from a file or URL
    Extract {
        #[arg(short = 'f', long)]
        file: String,
    },
}

async fn read_json(path: &Path) -> Result<Value, ApiError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ApiError::InvalidArgument(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&raw)?)
}

fn as_object(value: Value, what: &str) -> Result<Map<String, Value>, ApiError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::InvalidArgument(format!("{} must be a JSON object", what))),
    }
}

fn search_request(name: &str, query: &str, k: Option<usize>, folder: Option<&str>) -> Value {
    let mut kwargs = Map::new();
    if let Some(k) = k {
        kwargs.insert("k".into(), json!(k));
    }
    if let Some(folder) = folder {
        kwargs.insert("filter".into(), json!({"folder_path": folder}));
    }
    json!({"name": name, "query": query, "search_kwargs": kwargs})
}

pub fn chat_payload(
    base: Option<Value>,
    message: Option<&str>,
    k: Option<usize>,
    folder: Option<&str>,
    vector_db: &str,
) -> Result<Value, ApiError> {
    if base.is_none() && message.is_none() {
        return Err(ApiError::InvalidArgument("either -f or -m is required".to_string()));
    }
    let mut payload = as_object(base.unwrap_or_else(|| json!({})), "chat request")?;

    if let Some(message) = message {
        let chat_request = payload
            .entry("chat_request")
            .or_insert_with(|| json!({"messages": []}));
        let Some(messages) = chat_request
            .get_mut("messages")
            .and_then(Value::as_array_mut)
        else {
            return Err(ApiError::InvalidArgument(
                "chat_request.messages must be an array".to_string(),
            ));
        };
        messages.push(json!({"role": "user", "content": message}));

        if k.is_some() || folder.is_some() {
            let requests = payload
                .entry("vector_search_requests")
                .or_insert_with(|| json!([]));
            if let Some(list) = requests.as_array_mut() {
                list.push(search_request(vector_db, message, k, folder));
            }
        }
    }
    Ok(Value::Object(payload))
}

pub fn search_payload(
    base: Option<Value>,
    message: Option<&str>,
    k: Option<usize>,
    folder: Option<&str>,
    vector_db: &str,
) -> Result<Value, ApiError> {
    match (base, message) {
        (Some(base), _) => {
            let payload = as_object(base, "search request")?;
            if !payload.contains_key("vector_search_requests") {
                return Err(ApiError::InvalidArgument(
                    "vector_search_requests is required".to_string(),
                ));
            }
            Ok(Value::Object(payload))
        }
        (None, Some(query)) => Ok(json!({
            "vector_search_requests": [search_request(vector_db, query, k, folder)]
        })),
        (None, None) => Err(ApiError::InvalidArgument("either -f or -m is required".to_string())),
    }
}

/// Accepts a bare embedding request or one wrapped in `{embedding_request}`.
pub fn ingest_payload(base: Value, folder: Option<&str>, vector_db: &str) -> Result<Value, ApiError> {
    let mut payload = as_object(base, "embedding request")?;
    let mut request = match payload.remove("embedding_request") {
        Some(inner) => as_object(inner, "embedding_request")?,
        None => payload,
    };
    if let Some(folder) = folder {
        request.insert("folder_path".into(), json!(folder));
    }
    if !request.contains_key("name") && !request.contains_key("descriptor_name") {
        request.insert("name".into(), json!(vector_db));
    }
    Ok(json!({"embedding_request": request}))
}

struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    fn new(base: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(900))
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("POST {} failed: {}", url, e)))?;
        let status = response.status();
        let value: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("server returned {}", status));
            return Err(ApiError::Upstream(message));
        }
        Ok(value)
    }
}

async fn write_output(output: Option<&Path>, value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => tokio::fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", text),
    }
    Ok(())
}

async fn serve(paths_override: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(root) = paths_override {
        std::env::set_var(crate::core::config::paths::APP_DATA_PATH_ENV, root);
    }
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    let bind_addr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    );
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    info!("Listening on {}", addr);

    axum::serve(listener, router(Arc::clone(&state)))
        .await
        .context("Server error")?;
    Ok(())
}

async fn init(app_data: Option<PathBuf>) -> anyhow::Result<Value> {
    let paths = match app_data {
        Some(root) => AppPaths::with_root(root),
        None => AppPaths::from_env()?,
    };
    let env = EnvConfig::from_env()?;
    let catalog = CatalogStore::open(paths.main_db_path.clone()).await?;
    let seeded = catalog.initialize(&SeedDefaults::new(&paths, &env)).await?;
    let log = if seeded {
        format!("initialized {}", paths.main_db_path.display())
    } else {
        format!("{} was already initialized", paths.main_db_path.display())
    };
    Ok(json!({"log": log}))
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        server,
        app_data,
        output,
        command,
    } = cli;

    let result = match command {
        Command::Serve => return serve(app_data).await,
        Command::Init => {
            logging::init_stdout();
            init(app_data).await?
        }
        Command::Chat {
            file,
            message,
            k,
            folder,
            vector_db,
        } => {
            logging::init_stdout();
            let base = match file {
                Some(path) => Some(read_json(&path).await?),
                None => None,
            };
            let payload = chat_payload(base, message.as_deref(), k, folder.as_deref(), &vector_db)?;
            ApiClient::new(&server)?.post("/api/chat", &payload).await?
        }
        Command::Search {
            message,
            file,
            k,
            folder,
            vector_db,
        } => {
            logging::init_stdout();
            let base = match file {
                Some(path) => Some(read_json(&path).await?),
                None => None,
            };
            let payload = search_payload(base, message.as_deref(), k, folder.as_deref(), &vector_db)?;
            ApiClient::new(&server)?
                .post("/api/vector/search", &payload)
                .await?
        }
        Command::Ingest {
            file,
            folder,
            vector_db,
        } => {
            logging::init_stdout();
            let payload = ingest_payload(read_json(&file).await?, folder.as_deref(), &vector_db)?;
            ApiClient::new(&server)?
                .post("/api/vector/upsert", &payload)
                .await?
        }
        Command::Extract { file } => {
            logging::init_stdout();
            ApiClient::new(&server)?
                .post("/api/extract", &json!({"path": file}))
                .await?
        }
    };

    write_output(output.as_deref(), &result).await
}
