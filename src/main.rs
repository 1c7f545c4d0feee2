use std::sync::Arc;

use clap::Parser;

use pairrelay::api::{create_api_server, AppState};
use pairrelay::config::{Args, Config};
use pairrelay::session::{SessionConfig, SessionManager};
use pairrelay::storage::StorageBackend;
use pairrelay::upload::{UploadConfig, UploadEngine};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pairrelay=info,tower_http=info".into()),
        )
        .init();

    let config: Config = Args::parse().into();

    let storage = Arc::new(
        StorageBackend::new(config.storage_root.clone()).with_base_url(config.base_url.clone()),
    );

    let sessions = SessionManager::new(
        storage.clone(),
        SessionConfig {
            max_active_sessions: config.max_active_sessions,
            max_session_storage_bytes: config.max_session_storage_bytes,
            unused_grace: config.unused_grace,
            active_grace: config.active_grace,
            sweep_interval: config.session_sweep_interval,
        },
    );

    let uploads = UploadEngine::new(
        storage,
        UploadConfig {
            ttl: config.upload_ttl,
            sweep_interval: config.upload_sweep_interval,
        },
    );

    tokio::spawn(sessions.clone().run_sweeper());
    tokio::spawn(uploads.clone().run_sweeper());

    let state = AppState { sessions, uploads };
    let app = create_api_server(state, &config.allowed_origins);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(address = %addr, base_url = %config.base_url, "starting pairrelay server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listening address");

    axum::serve(listener, app).await.expect("server error");
}
