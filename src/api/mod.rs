pub mod error;
pub mod gateway;
pub mod rest;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use rest::AppState;
pub use types::*;
pub use websocket::websocket_handler;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the full HTTP + event-channel router. `allowed_origins` is empty to
/// allow any origin; otherwise only the listed origins are permitted. The
/// same list gates the REST surface's Origin/Referer/User-Agent admission
/// check; the event channel is not subject to it.
pub fn create_api_server(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let ws_router = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state.clone());

    let gate_state = Arc::new(allowed_origins.to_vec());
    let gated_rest = rest::router(state)
        .layer(from_fn_with_state(gate_state, gateway::admission_gate));

    gated_rest
        .merge(ws_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionConfig, SessionManager};
    use crate::storage::StorageBackend;
    use crate::upload::{UploadConfig, UploadEngine};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_api_server_creation() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageBackend::new(dir.path()));
        let state = AppState {
            sessions: SessionManager::new(storage.clone(), SessionConfig::default()),
            uploads: UploadEngine::new(storage, UploadConfig::default()),
        };
        let _app = create_api_server(state, &[]);
    }

    #[tokio::test]
    async fn test_gateway_rejects_automation_agent() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::Service;

        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageBackend::new(dir.path()));
        let state = AppState {
            sessions: SessionManager::new(storage.clone(), SessionConfig::default()),
            uploads: UploadEngine::new(storage, UploadConfig::default()),
        };
        let mut app = create_api_server(state, &[]);

        let request = Request::builder()
            .uri("/api/code")
            .header("user-agent", "curl/8.4.0")
            .body(Body::empty())
            .unwrap();
        let response = app.call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_gateway_rejects_origin_not_on_allow_list() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::Service;

        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageBackend::new(dir.path()));
        let state = AppState {
            sessions: SessionManager::new(storage.clone(), SessionConfig::default()),
            uploads: UploadEngine::new(storage, UploadConfig::default()),
        };
        let mut app = create_api_server(state, &["https://relay.example.com".to_string()]);

        let request = Request::builder()
            .uri("/api/code")
            .header("user-agent", "Mozilla/5.0")
            .header("origin", "https://evil.example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
