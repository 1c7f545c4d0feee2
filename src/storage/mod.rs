//! On-disk per-session file namespace.
//!
//! Each session owns a disjoint subtree under a single configured root, so no
//! cross-session locking is needed here; callers are responsible for keeping
//! filesystem work off any session-level lock (see the session module).

mod error;
mod types;

pub use error::{StorageError, StorageResult};
pub use types::SessionUsage;

use std::collections::HashSet;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

pub struct StorageBackend {
    root: PathBuf,
    base_url: Option<String>,
}

impl StorageBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), base_url: None }
    }

    /// Attaches the public base URL used to build absolute download links.
    /// Without it, `allocate_file_path` returns a root-relative URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn session_dir(&self, code: &str) -> PathBuf {
        self.root.join(code)
    }

    fn files_dir(&self, code: &str) -> PathBuf {
        self.session_dir(code).join("files")
    }

    fn chunks_dir(&self, code: &str) -> PathBuf {
        self.session_dir(code).join("chunks")
    }

    fn validate_component(component: &str) -> StorageResult<()> {
        if component.is_empty()
            || component.contains('/')
            || component.contains('\\')
            || component.contains("..")
        {
            return Err(StorageError::InvalidPath(component.to_string()));
        }
        Ok(())
    }

    pub async fn create_session_tree(&self, code: &str) -> StorageResult<()> {
        Self::validate_component(code)?;
        fs::create_dir_all(self.files_dir(code)).await?;
        fs::create_dir_all(self.chunks_dir(code)).await?;
        Ok(())
    }

    /// Recursive removal. Tolerates a tree that no longer exists.
    pub async fn delete_session_tree(&self, code: &str) -> StorageResult<()> {
        Self::validate_component(code)?;
        match fs::remove_dir_all(self.session_dir(code)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the destination path, the stored (on-disk) name, and the
    /// download URL. Does not create the file.
    pub fn allocate_file_path(
        &self,
        code: &str,
        original_name: &str,
    ) -> StorageResult<(PathBuf, String, String)> {
        Self::validate_component(code)?;
        let sanitized = sanitize_filename(original_name);
        let stored_name = format!("{}-{}", chrono::Utc::now().timestamp_millis(), sanitized);
        Self::validate_component(&stored_name)?;
        let abs_path = self.files_dir(code).join(&stored_name);
        let download_url = match &self.base_url {
            Some(base) => format!("{}/downloads/{code}/{stored_name}", base.trim_end_matches('/')),
            None => format!("/downloads/{code}/{stored_name}"),
        };
        Ok((abs_path, stored_name, download_url))
    }

    pub fn allocate_chunk_dir(&self, code: &str, upload_id: &str) -> StorageResult<PathBuf> {
        Self::validate_component(code)?;
        Self::validate_component(upload_id)?;
        Ok(self.chunks_dir(code).join(upload_id))
    }

    /// Recursively scans the session's `files/` tree for byte count and file count.
    pub async fn session_usage(&self, code: &str) -> StorageResult<SessionUsage> {
        Self::validate_component(code)?;
        let mut usage = SessionUsage::default();
        let mut stack = vec![self.files_dir(code)];

        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    stack.push(entry.path());
                } else {
                    usage.bytes += metadata.len();
                    usage.file_count += 1;
                }
            }
        }

        Ok(usage)
    }

    /// Deletes every child directory of the root not present in `live_codes`.
    /// Returns the number of directories removed.
    pub async fn sweep_orphans(&self, live_codes: &HashSet<String>) -> StorageResult<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.metadata().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if live_codes.contains(&name) {
                continue;
            }
            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    removed += 1;
                    debug!(code = %name, "swept orphan session directory");
                }
                Err(e) => warn!(code = %name, error = %e, "failed to sweep orphan directory"),
            }
        }

        Ok(removed)
    }

    /// Resolves `stored_name` under `<root>/<code>/files/`, rejecting any
    /// component that could escape the session's subtree and verifying the
    /// canonicalized path still lies within it.
    pub async fn serve(&self, code: &str, stored_name: &str) -> StorageResult<PathBuf> {
        Self::validate_component(code)?;
        Self::validate_component(stored_name)?;

        let files_dir = self.files_dir(code);
        let candidate = files_dir.join(stored_name);

        let canonical = fs::canonicalize(&candidate).await?;
        let expected_root = fs::canonicalize(&files_dir).await?;
        if !canonical.starts_with(&expected_root) {
            return Err(StorageError::InvalidPath(stored_name.to_string()));
        }

        Ok(canonical)
    }
}

fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = base.replace("..", "_");
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_and_delete_session_tree() {
        let dir = TempDir::new().unwrap();
        let backend = StorageBackend::new(dir.path());

        backend.create_session_tree("ABC123").await.unwrap();
        assert!(dir.path().join("ABC123/files").is_dir());
        assert!(dir.path().join("ABC123/chunks").is_dir());

        // idempotent
        backend.create_session_tree("ABC123").await.unwrap();

        backend.delete_session_tree("ABC123").await.unwrap();
        assert!(!dir.path().join("ABC123").exists());

        // tolerates nonexistent tree
        backend.delete_session_tree("ABC123").await.unwrap();
    }

    #[test]
    fn test_allocate_file_path_sanitizes_name() {
        let backend = StorageBackend::new("/tmp/does-not-matter");
        let (path, stored_name, url) = backend
            .allocate_file_path("ABC123", "../../etc/passwd")
            .unwrap();
        assert!(!stored_name.contains(".."));
        assert!(path.to_string_lossy().contains("ABC123"));
        assert!(url.starts_with("/downloads/ABC123/"));
    }

    #[test]
    fn test_allocate_file_path_uses_configured_base_url() {
        let backend = StorageBackend::new("/tmp/does-not-matter")
            .with_base_url("https://relay.example.com");
        let (_, _, url) = backend.allocate_file_path("ABC123", "note.txt").unwrap();
        assert!(url.starts_with("https://relay.example.com/downloads/ABC123/"));
    }

    #[test]
    fn test_allocate_rejects_traversal_in_code() {
        let backend = StorageBackend::new("/tmp/does-not-matter");
        let result = backend.allocate_file_path("../ABC123", "file.bin");
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_session_usage_counts_files() {
        let dir = TempDir::new().unwrap();
        let backend = StorageBackend::new(dir.path());
        backend.create_session_tree("ABC123").await.unwrap();

        fs::write(dir.path().join("ABC123/files/one.bin"), vec![0u8; 100])
            .await
            .unwrap();
        fs::write(dir.path().join("ABC123/files/two.bin"), vec![0u8; 50])
            .await
            .unwrap();

        let usage = backend.session_usage("ABC123").await.unwrap();
        assert_eq!(usage.bytes, 150);
        assert_eq!(usage.file_count, 2);
    }

    #[tokio::test]
    async fn test_sweep_orphans_removes_unlisted_dirs() {
        let dir = TempDir::new().unwrap();
        let backend = StorageBackend::new(dir.path());
        backend.create_session_tree("LIVE01").await.unwrap();
        backend.create_session_tree("DEAD01").await.unwrap();

        let live: HashSet<String> = ["LIVE01".to_string()].into_iter().collect();
        let removed = backend.sweep_orphans(&live).await.unwrap();

        assert_eq!(removed, 1);
        assert!(dir.path().join("LIVE01").exists());
        assert!(!dir.path().join("DEAD01").exists());
    }

    #[tokio::test]
    async fn test_serve_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let backend = StorageBackend::new(dir.path());
        backend.create_session_tree("ABC123").await.unwrap();

        let result = backend.serve("ABC123", "../../../etc/passwd").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_serve_returns_path_for_existing_file() {
        let dir = TempDir::new().unwrap();
        let backend = StorageBackend::new(dir.path());
        backend.create_session_tree("ABC123").await.unwrap();
        fs::write(dir.path().join("ABC123/files/1-hello.txt"), b"hi")
            .await
            .unwrap();

        let path = backend.serve("ABC123", "1-hello.txt").await.unwrap();
        assert!(path.ends_with("ABC123/files/1-hello.txt"));
    }
}
