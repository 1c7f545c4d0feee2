use serde::{Deserialize, Serialize};

/// Server-visible metadata for a file handed off through the upload engine.
/// The client augments this with its own key material before broadcasting
/// it as a message; the server never sees or stores that key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub download_url: String,
}

/// The caller-supplied body of a message, before the server stamps
/// `sender`/`timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    Text { content: String },
    File { metadata: FileDescriptor },
}

/// A message as stored in a session's history, after the server has
/// stamped `sender` and `timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(flatten)]
    pub body: MessageBody,
    pub sender: String,
    pub timestamp: i64,
}
