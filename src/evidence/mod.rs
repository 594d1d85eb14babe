//! Diagnostic snapshot storage.
//!
//! When a step fails, the page as the browser last rendered it is persisted
//! so the failure can be diagnosed without re-running.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

/// Persists opaque snapshot blobs. Returns a reference to what was stored.
#[async_trait::async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn persist(&self, blob: &[u8], name_hint: &str) -> Result<String>;
}

/// Writes snapshots as PNG files under a directory.
pub struct FsEvidenceStore {
    dir: PathBuf,
}

impl FsEvidenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl EvidenceStore for FsEvidenceStore {
    async fn persist(&self, blob: &[u8], name_hint: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let file = format!(
            "{}_{}.png",
            sanitize(name_hint),
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.dir.join(file);
        tokio::fs::write(&path, blob)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!(path = %path.display(), bytes = blob.len(), "Diagnostic snapshot saved");
        Ok(path.display().to_string())
    }
}

fn sanitize(hint: &str) -> String {
    hint.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Keeps snapshots in memory.
#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
pub struct MemoryEvidenceStore {
    items: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name hints of everything stored so far.
    pub fn names(&self) -> Vec<String> {
        self.items
            .lock()
            .map(|items| items.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait::async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn persist(&self, blob: &[u8], name_hint: &str) -> Result<String> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow::anyhow!("evidence store poisoned"))?;
        items.push((name_hint.to_string(), blob.to_vec()));
        Ok(format!("memory:{}", items.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_names_path_safe() {
        assert_eq!(sanitize("run-1/fill form"), "run-1_fill_form");
    }

    #[tokio::test]
    async fn test_fs_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsEvidenceStore::new(dir.path().join("shots"));

        let reference = store.persist(b"png", "abc_submit").await.unwrap();
        let written = std::fs::read(&reference).unwrap();
        assert_eq!(written, b"png");
        assert!(reference.contains("abc_submit_"));
    }

    #[tokio::test]
    async fn test_memory_store_records_names() {
        let store = MemoryEvidenceStore::new();
        store.persist(b"a", "one").await.unwrap();
        let r = store.persist(b"b", "two").await.unwrap();
        assert_eq!(r, "memory:1");
        assert_eq!(store.names(), vec!["one", "two"]);
    }
}
