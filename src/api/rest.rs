use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::fs;

use crate::message::{FileDescriptor, MessageBody};
use crate::session::{ClientToken, SessionManager};
use crate::upload::UploadEngine;

use super::error::{ApiError, ApiResult};
use super::types::{
    ChunkPutResponse, PairingCodeResponse, ProgressResponse, ServerStatsResponse,
    StorageUsageResponse, UploadCompleteResponse, UploadInitRequest, UploadInitResponse,
};

const SESSION_ID_HEADER: &str = "x-session-id";

/// Reads the pairing code off the `X-Session-Id` header required by every
/// upload endpoint.
fn session_id_header(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::InvalidRequest("missing \"X-Session-Id\" header".into()))
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub uploads: Arc<UploadEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/code", get(get_pairing_code))
        .route("/api/upload", post(upload_single_shot))
        .route("/api/upload/init", post(upload_init))
        .route("/api/upload/chunk", post(upload_put_chunk))
        .route("/api/upload/complete", post(upload_complete))
        .route("/api/upload/progress/:upload_id", get(upload_progress))
        .route("/api/upload/:upload_id", delete(upload_cancel))
        .route("/api/session/:code/storage", get(session_storage))
        .route("/api/server/stats", get(server_stats))
        .route("/downloads/:code/:filename", get(download_file))
        .with_state(state)
}

/// The `temp` code is a client-side placeholder used before a real pairing
/// code is known; the server must never treat it as a lookupable or
/// creatable session.
fn reject_temp_code(code: &str) -> ApiResult<()> {
    if code.eq_ignore_ascii_case("temp") {
        return Err(ApiError::InvalidRequest(
            "\"temp\" is a client-side placeholder and is not a valid session code".to_string(),
        ));
    }
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "pairrelay", "version": env!("CARGO_PKG_VERSION") }))
}

async fn get_pairing_code(
    State(state): State<AppState>,
) -> ApiResult<Json<PairingCodeResponse>> {
    let code = state.sessions.create_session().await?;
    Ok(Json(PairingCodeResponse { code }))
}

async fn upload_single_shot(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadCompleteResponse>)> {
    let code = session_id_header(&headers)?;
    reject_temp_code(&code)?;

    let mut client_token: Option<String> = None;
    let mut file_name: Option<String> = None;
    let mut mime_type = "application/octet-stream".to_string();
    let mut data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("invalid multipart field: {e}")))?
    {
        match field.name().unwrap_or("") {
            "clientToken" => client_token = Some(field.text().await.unwrap_or_default()),
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidRequest(format!("failed to read file: {e}")))?;
                data = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let data = data.ok_or_else(|| ApiError::InvalidRequest("missing \"file\" field".into()))?;
    let file_name = file_name.unwrap_or_else(|| "upload.bin".to_string());

    if !state.sessions.code_exists(&code) {
        return Err(ApiError::Session(crate::session::SessionError::InvalidCode));
    }
    state.sessions.check_quota(&code, data.len() as u64).await?;

    let upload_id = state
        .uploads
        .init(&code, file_name, data.len() as u64, 1, mime_type)
        .await?;
    state.uploads.put_chunk(&upload_id, 0, &data).await?;
    let (descriptor, written) = state.uploads.complete(&upload_id).await?;
    state.sessions.account_storage(&code, written).await;

    let message = finish_upload_message(&state, &code, client_token, descriptor).await?;
    Ok((StatusCode::CREATED, Json(UploadCompleteResponse { message })))
}

async fn upload_init(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UploadInitRequest>,
) -> ApiResult<(StatusCode, Json<UploadInitResponse>)> {
    let code = session_id_header(&headers)?;
    reject_temp_code(&code)?;
    if !state.sessions.code_exists(&code) {
        return Err(ApiError::Session(crate::session::SessionError::InvalidCode));
    }
    state.sessions.check_quota(&code, req.file_size).await?;

    let upload_id = state
        .uploads
        .init(
            &code,
            req.file_name,
            req.file_size,
            req.total_chunks,
            req.mime_type,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(UploadInitResponse { upload_id })))
}

async fn upload_put_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ChunkPutResponse>> {
    let mut upload_id: Option<String> = None;
    let mut index: Option<u32> = None;
    let mut data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("invalid multipart field: {e}")))?
    {
        match field.name().unwrap_or("") {
            "uploadId" => upload_id = Some(field.text().await.unwrap_or_default()),
            "chunkIndex" => {
                let text = field.text().await.unwrap_or_default();
                index = text.parse().ok();
            }
            "chunk" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidRequest(format!("failed to read chunk: {e}")))?;
                data = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let upload_id = upload_id.ok_or_else(|| ApiError::InvalidRequest("missing \"uploadId\"".into()))?;
    let index = index.ok_or_else(|| ApiError::InvalidRequest("missing or invalid \"chunkIndex\"".into()))?;
    let data = data.ok_or_else(|| ApiError::InvalidRequest("missing \"chunk\"".into()))?;

    state.uploads.put_chunk(&upload_id, index, &data).await?;
    let progress = state.uploads.progress(&upload_id).await?;
    Ok(Json(ChunkPutResponse { success: true, progress }))
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadCompleteRequest {
    upload_id: String,
    code: String,
    client_token: Option<String>,
}

async fn upload_complete(
    State(state): State<AppState>,
    Json(req): Json<UploadCompleteRequest>,
) -> ApiResult<Json<UploadCompleteResponse>> {
    reject_temp_code(&req.code)?;
    let (descriptor, written) = state.uploads.complete(&req.upload_id).await?;
    state.sessions.account_storage(&req.code, written).await;

    let message = finish_upload_message(&state, &req.code, req.client_token, descriptor).await?;
    Ok(Json(UploadCompleteResponse { message }))
}

async fn finish_upload_message(
    state: &AppState,
    code: &str,
    client_token: Option<String>,
    descriptor: FileDescriptor,
) -> ApiResult<crate::message::Message> {
    let token: ClientToken = client_token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| ApiError::InvalidRequest("missing or invalid \"clientToken\"".into()))?;

    let message = state
        .sessions
        .append_message(code, token, MessageBody::File { metadata: descriptor })
        .await?;
    Ok(message)
}

async fn upload_progress(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<ProgressResponse>> {
    let progress = state.uploads.progress(&upload_id).await?;
    Ok(Json(progress))
}

async fn upload_cancel(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.uploads.cancel(&upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn session_storage(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<StorageUsageResponse>> {
    reject_temp_code(&code)?;
    if !state.sessions.code_exists(&code) {
        return Err(ApiError::Session(crate::session::SessionError::InvalidCode));
    }
    let usage = state.sessions.storage().session_usage(&code).await?;
    Ok(Json(StorageUsageResponse {
        bytes: usage.bytes,
        file_count: usage.file_count,
        limit_bytes: -1,
    }))
}

async fn server_stats(State(state): State<AppState>) -> Json<ServerStatsResponse> {
    Json(state.sessions.stats().into())
}

async fn download_file(
    State(state): State<AppState>,
    Path((code, filename)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    reject_temp_code(&code)?;
    let path = state.sessions.storage().serve(&code, &filename).await?;
    let bytes = fs::read(&path).await.map_err(crate::storage::StorageError::from)?;

    let content_type = mime_guess_from_name(&filename);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(bytes),
    ))
}

fn mime_guess_from_name(filename: &str) -> &'static str {
    match filename.rsplit('.').next().unwrap_or("") {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
