use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageBody};
use crate::session::SessionStats;
use crate::upload::UploadProgress;

#[derive(Debug, Clone, Serialize)]
pub struct PairingCodeResponse {
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitRequest {
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPutResponse {
    pub success: bool,
    pub progress: UploadProgress,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitResponse {
    pub upload_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleteResponse {
    pub message: Message,
}

pub type ProgressResponse = UploadProgress;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsageResponse {
    pub bytes: u64,
    pub file_count: u64,
    pub limit_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatsResponse {
    pub active_sessions: i64,
    pub max_sessions: i64,
    pub usage_percent: f64,
}

impl From<SessionStats> for ServerStatsResponse {
    fn from(stats: SessionStats) -> Self {
        Self {
            active_sessions: stats.active,
            max_sessions: stats.max,
            usage_percent: stats.usage_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Client -> server event-channel frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        code: String,
        client_token: Option<String>,
    },
    SendMessage {
        match_code: String,
        client_token: String,
        message: MessageBody,
    },
}

/// Server -> client event-channel frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    SessionJoined {
        client_token: String,
        history: Vec<Message>,
    },
    ReceiveMessage {
        message: Message,
    },
    UserConnected,
    UserDisconnected,
    Error {
        message: String,
    },
}
