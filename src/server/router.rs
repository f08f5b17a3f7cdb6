use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{agents, catalog, chat, extract, health, sessions, vector};
use crate::server::ws::handler::ws_handler;
use crate::state::AppState;

/// Main router: health, chat, vector operations, catalog resources, session
/// cancellation, agent runs (plain and streamed) and text extraction.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/chat", post(chat::chat))
        .route("/api/vector/search", post(vector::search))
        .route("/api/vector/upsert", post(vector::upsert))
        .route("/api/vector/delete", post(vector::delete))
        .route(
            "/api/vector/collection/delete",
            post(vector::delete_collection),
        )
        .route(
            "/api/vector_db",
            get(catalog::list_vector_dbs).post(catalog::upsert_vector_db),
        )
        .route(
            "/api/folders",
            get(catalog::list_folders).post(catalog::upsert_folder),
        )
        .route("/api/folders/:folder_id", delete(catalog::delete_folder))
        .route("/api/sessions/cancel", post(sessions::cancel_session))
        .route("/api/agents/run", post(agents::run_agent))
        .route("/api/agents/stream", get(ws_handler))
        .route("/api/extract", post(extract::extract))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let configured = &state.settings.server.cors_allowed_origins;
    let origins = if configured.is_empty() {
        default_local_origins()
    } else {
        configured.clone()
    };
    let allow_origin = AllowOrigin::list(
        origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>(),
    );

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn default_local_origins() -> Vec<String> {
    [
        "http://localhost",
        "http://localhost:3000",
        "http://localhost:5173",
        "http://127.0.0.1",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:5173",
    ]
    .iter()
    .map(|origin| origin.to_string())
    .collect()
}
