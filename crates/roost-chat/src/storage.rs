//! File storage seam for attachments and group avatars. Deletion
//! failures are logged, never fatal; only the initial store of an
//! upload propagates an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

pub trait FileStore: Send + Sync {
    /// Persist a file under the given directory prefix; returns the
    /// stored path used for later retrieval and deletion.
    fn store(&self, dir: &str, original_name: &str, data: &[u8]) -> Result<String>;

    /// Remove a stored file. Returns false (and logs) on failure.
    fn delete(&self, path: &str) -> bool;
}

/// Classify an upload by file extension; drives the attachment kind
/// column.
pub fn kind_for_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg" | "png" | "gif" | "webp") => "image",
        Some("mp4" | "mov" | "webm" | "mkv") => "video",
        Some("mp3" | "wav" | "ogg" | "m4a") => "audio",
        _ => "file",
    }
}

/// On-disk store rooted at a directory. Stored names are generated, so
/// colliding original names never overwrite each other.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileStore for LocalFileStore {
    fn store(&self, dir: &str, original_name: &str, data: &[u8]) -> Result<String> {
        let generated = match Path::new(original_name).extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let rel = format!("{dir}/{generated}");
        let full = self.root.join(&rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, data)?;
        info!("stored {} ({} bytes)", rel, data.len());
        Ok(rel)
    }

    fn delete(&self, path: &str) -> bool {
        match fs::remove_file(self.root.join(path)) {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to delete {}: {}", path, e);
                false
            }
        }
    }
}

/// In-memory store for tests: remembers what was stored and deleted.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    pub stored: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl FileStore for MemoryFileStore {
    fn store(&self, dir: &str, original_name: &str, _data: &[u8]) -> Result<String> {
        let path = format!("{dir}/{}-{original_name}", Uuid::new_v4());
        self.stored
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.clone());
        Ok(path)
    }

    fn delete(&self, path: &str) -> bool {
        self.deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_string());
        true
    }
}
