use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::message::FileDescriptor;
use crate::storage::StorageBackend;

use super::error::{UploadError, UploadResult};
use super::types::{UploadProgress, UploadSession};

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(86_400),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Drives chunked (and, as a one-chunk degenerate case, single-shot) file
/// uploads. Each upload is serialized behind its own mutex so `put_chunk`
/// can never race `complete`; unrelated uploads proceed fully in parallel.
pub struct UploadEngine {
    uploads: DashMap<String, Arc<Mutex<UploadSession>>>,
    storage: Arc<StorageBackend>,
    config: UploadConfig,
}

impl UploadEngine {
    pub fn new(storage: Arc<StorageBackend>, config: UploadConfig) -> Arc<Self> {
        Arc::new(Self {
            uploads: DashMap::new(),
            storage,
            config,
        })
    }

    pub async fn init(
        &self,
        code: &str,
        file_name: String,
        total_size: u64,
        chunk_count: u32,
        mime_type: String,
    ) -> UploadResult<String> {
        let upload_id = Uuid::new_v4().simple().to_string();
        let temp_dir = self.storage.allocate_chunk_dir(code, &upload_id)?;
        fs::create_dir_all(&temp_dir).await?;

        let now = chrono::Utc::now().timestamp_millis();
        let session = UploadSession {
            code: code.to_string(),
            file_name,
            total_size,
            chunk_count,
            mime_type,
            received_chunks: Default::default(),
            chunk_paths: HashMap::new(),
            created_at: now,
            last_activity_at: now,
            temp_dir,
        };

        self.uploads.insert(upload_id.clone(), Arc::new(Mutex::new(session)));
        info!(upload_id = %upload_id, code = %code, "upload initialized");
        Ok(upload_id)
    }

    fn get(&self, upload_id: &str) -> UploadResult<Arc<Mutex<UploadSession>>> {
        self.uploads
            .get(upload_id)
            .map(|e| e.value().clone())
            .ok_or(UploadError::NotFound)
    }

    /// Idempotent: writing the same index twice just overwrites the chunk
    /// file on disk.
    pub async fn put_chunk(&self, upload_id: &str, index: u32, data: &[u8]) -> UploadResult<()> {
        let upload = self.get(upload_id)?;
        let mut upload = upload.lock().await;

        if index >= upload.chunk_count {
            return Err(UploadError::InvalidIndex {
                index,
                total: upload.chunk_count,
            });
        }

        let path = upload.temp_dir.join(format!("chunk_{index}"));
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        upload.chunk_paths.insert(index, path);
        upload.received_chunks.insert(index);
        upload.touch();
        Ok(())
    }

    pub async fn progress(&self, upload_id: &str) -> UploadResult<UploadProgress> {
        let upload = self.get(upload_id)?;
        let upload = upload.lock().await;
        let received = upload.received_chunks.len() as u32;
        Ok(UploadProgress {
            total_chunks: upload.chunk_count,
            received_chunks: received,
            progress: if upload.chunk_count == 0 {
                1.0
            } else {
                received as f64 / upload.chunk_count as f64
            },
            missing_chunks: upload.missing_chunks(),
        })
    }

    /// Concatenates chunks 0..chunk_count in order into the session's
    /// `files/` tree, verifies the assembled size, and removes the temp
    /// directory. Fails without touching the destination file if any chunk
    /// is missing or the assembled size doesn't match what was declared at
    /// `init`.
    pub async fn complete(&self, upload_id: &str) -> UploadResult<(FileDescriptor, u64)> {
        let upload = self.get(upload_id)?;
        let mut upload = upload.lock().await;

        if !upload.is_complete() {
            return Err(UploadError::Incomplete(upload.missing_chunks().len()));
        }

        let (dest_path, _stored_name, download_url) =
            self.storage.allocate_file_path(&upload.code, &upload.file_name)?;

        let mut out = fs::File::create(&dest_path).await?;
        let mut written: u64 = 0;
        for index in 0..upload.chunk_count {
            let path = upload
                .chunk_paths
                .get(&index)
                .expect("is_complete guarantees every index has a path");
            let bytes = fs::read(path).await?;
            written += bytes.len() as u64;
            out.write_all(&bytes).await?;
        }
        out.flush().await?;

        if written != upload.total_size {
            fs::remove_file(&dest_path).await.ok();
            return Err(UploadError::SizeMismatch {
                expected: upload.total_size,
                actual: written,
            });
        }

        if let Err(e) = fs::remove_dir_all(&upload.temp_dir).await {
            warn!(upload_id = %upload_id, error = %e, "failed to remove upload temp dir after completion");
        }

        let descriptor = FileDescriptor {
            name: upload.file_name.clone(),
            size: written,
            mime_type: upload.mime_type.clone(),
            download_url,
        };
        let code_bytes = written;
        drop(upload);
        self.uploads.remove(upload_id);
        info!(upload_id = %upload_id, "upload completed");
        Ok((descriptor, code_bytes))
    }

    pub async fn cancel(&self, upload_id: &str) -> UploadResult<()> {
        let upload = self.get(upload_id)?;
        let upload = upload.lock().await;
        fs::remove_dir_all(&upload.temp_dir).await.ok();
        drop(upload);
        self.uploads.remove(upload_id);
        Ok(())
    }

    pub async fn run_sweeper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        loop {
            interval.tick().await;
            self.sweep_once().await;
        }
    }

    async fn sweep_once(&self) {
        let cutoff = chrono::Utc::now().timestamp_millis() - self.config.ttl.as_millis() as i64;
        let stale: Vec<String> = {
            let mut ids = Vec::new();
            for entry in self.uploads.iter() {
                let upload = entry.value().lock().await;
                if upload.last_activity_at < cutoff {
                    ids.push(entry.key().clone());
                }
            }
            ids
        };

        for upload_id in stale {
            if let Err(e) = self.cancel(&upload_id).await {
                warn!(upload_id = %upload_id, error = %e, "failed to sweep stale upload");
            } else {
                info!(upload_id = %upload_id, "swept stale upload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> Arc<UploadEngine> {
        let storage = Arc::new(StorageBackend::new(dir.path()));
        UploadEngine::new(storage, UploadConfig::default())
    }

    #[tokio::test]
    async fn test_init_put_complete_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageBackend::new(dir.path()));
        storage.create_session_tree("ABC123").await.unwrap();
        let eng = UploadEngine::new(storage, UploadConfig::default());

        let id = eng
            .init("ABC123", "hello.txt".into(), 10, 2, "text/plain".into())
            .await
            .unwrap();

        eng.put_chunk(&id, 0, b"hello").await.unwrap();
        eng.put_chunk(&id, 1, b"world").await.unwrap();

        let (descriptor, size) = eng.complete(&id).await.unwrap();
        assert_eq!(size, 10);
        assert_eq!(descriptor.size, 10);
        assert!(descriptor.download_url.starts_with("/downloads/ABC123/"));
    }

    #[tokio::test]
    async fn test_complete_rejects_missing_chunks() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageBackend::new(dir.path()));
        storage.create_session_tree("ABC123").await.unwrap();
        let eng = UploadEngine::new(storage, UploadConfig::default());

        let id = eng
            .init("ABC123", "hello.txt".into(), 10, 2, "text/plain".into())
            .await
            .unwrap();
        eng.put_chunk(&id, 0, b"hello").await.unwrap();

        let result = eng.complete(&id).await;
        assert!(matches!(result, Err(UploadError::Incomplete(1))));
    }

    #[tokio::test]
    async fn test_put_chunk_rejects_out_of_range_index() {
        let dir = TempDir::new().unwrap();
        let eng = engine(&dir);
        let id = eng
            .init("ABC123", "f.bin".into(), 5, 1, "application/octet-stream".into())
            .await
            .unwrap();

        let result = eng.put_chunk(&id, 5, b"x").await;
        assert!(matches!(result, Err(UploadError::InvalidIndex { .. })));
    }

    #[tokio::test]
    async fn test_put_chunk_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageBackend::new(dir.path()));
        storage.create_session_tree("ABC123").await.unwrap();
        let eng = UploadEngine::new(storage, UploadConfig::default());

        let id = eng
            .init("ABC123", "f.bin".into(), 5, 1, "application/octet-stream".into())
            .await
            .unwrap();
        eng.put_chunk(&id, 0, b"hello").await.unwrap();
        eng.put_chunk(&id, 0, b"hello").await.unwrap();

        let progress = eng.progress(&id).await.unwrap();
        assert_eq!(progress.received_chunks, 1);
    }

    #[tokio::test]
    async fn test_cancel_removes_upload() {
        let dir = TempDir::new().unwrap();
        let eng = engine(&dir);
        let id = eng
            .init("ABC123", "f.bin".into(), 5, 1, "application/octet-stream".into())
            .await
            .unwrap();
        eng.cancel(&id).await.unwrap();
        assert!(matches!(eng.progress(&id).await, Err(UploadError::NotFound)));
    }
}
