use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Server-side bookkeeping for one in-progress chunked upload. Chunks land
/// under `temp_dir` named by index and are concatenated into the session's
/// `files/` tree on [`super::manager::UploadEngine::complete`].
pub struct UploadSession {
    pub code: String,
    pub file_name: String,
    pub total_size: u64,
    pub chunk_count: u32,
    pub mime_type: String,
    pub received_chunks: HashSet<u32>,
    pub chunk_paths: HashMap<u32, PathBuf>,
    pub created_at: i64,
    pub last_activity_at: i64,
    pub temp_dir: PathBuf,
}

impl UploadSession {
    pub fn touch(&mut self) {
        self.last_activity_at = chrono::Utc::now().timestamp_millis();
    }

    pub fn is_complete(&self) -> bool {
        self.received_chunks.len() as u32 >= self.chunk_count
    }

    pub fn missing_chunks(&self) -> Vec<u32> {
        (0..self.chunk_count)
            .filter(|i| !self.received_chunks.contains(i))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadProgress {
    pub total_chunks: u32,
    pub received_chunks: u32,
    pub progress: f64,
    pub missing_chunks: Vec<u32>,
}
