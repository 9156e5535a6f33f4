use crate::errors::VisionError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Where scripts and uploaded file literals live.
#[async_trait::async_trait]
pub trait ScriptStore: Send + Sync {
    async fn read_script(&self, path: &str) -> Result<String, VisionError>;

    /// Replace the script at `path` with `contents`.
    async fn write_script(&self, path: &str, contents: &str) -> Result<(), VisionError>;

    /// Contents of the upload `name`, or `None` if it does not exist.
    async fn read_upload(&self, name: &str) -> Result<Option<String>, VisionError>;

    async fn write_upload(&self, name: &str, contents: &str) -> Result<(), VisionError>;

    /// Where the upload `name` is (or would be) kept.
    fn upload_path(&self, name: &str) -> PathBuf;
}

/// Scripts under a test directory, uploads under an upload directory.
#[derive(Debug, Clone)]
pub struct FsScriptStore {
    test_dir: PathBuf,
    upload_dir: PathBuf,
}

impl FsScriptStore {
    pub fn new(test_dir: impl Into<PathBuf>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            test_dir: test_dir.into(),
            upload_dir: upload_dir.into(),
        }
    }

    fn script_path(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.test_dir.join(candidate)
        }
    }
}

#[async_trait::async_trait]
impl ScriptStore for FsScriptStore {
    async fn read_script(&self, path: &str) -> Result<String, VisionError> {
        let full = self.script_path(path);
        debug!("Reading script {}", full.display());
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| VisionError::Script(format!("Cannot read {}: {e}", full.display())))
    }

    async fn write_script(&self, path: &str, contents: &str) -> Result<(), VisionError> {
        let full = self.script_path(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!("Writing script {}", full.display());
        tokio::fs::write(&full, contents)
            .await
            .map_err(|e| VisionError::Script(format!("Cannot write {}: {e}", full.display())))
    }

    async fn read_upload(&self, name: &str) -> Result<Option<String>, VisionError> {
        let full = self.upload_path(name);
        match tokio::fs::read_to_string(&full).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VisionError::Script(format!(
                "Cannot read {}: {e}",
                full.display()
            ))),
        }
    }

    async fn write_upload(&self, name: &str, contents: &str) -> Result<(), VisionError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let full = self.upload_path(name);
        tokio::fs::write(&full, contents)
            .await
            .map_err(|e| VisionError::Script(format!("Cannot write {}: {e}", full.display())))
    }

    fn upload_path(&self, name: &str) -> PathBuf {
        self.upload_dir.join(name)
    }
}

/// Scripts and uploads held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    scripts: Mutex<HashMap<String, String>>,
    uploads: Mutex<HashMap<String, String>>,
    reads: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, path: &str, contents: &str) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(path.to_string(), contents.to_string());
        }
        self
    }

    pub fn with_upload(self, name: &str, contents: &str) -> Self {
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.insert(name.to_string(), contents.to_string());
        }
        self
    }

    pub fn script(&self, path: &str) -> Option<String> {
        self.scripts.lock().ok()?.get(path).cloned()
    }

    pub fn upload(&self, name: &str) -> Option<String> {
        self.uploads.lock().ok()?.get(name).cloned()
    }

    /// Paths passed to `read_script`, in order.
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> VisionError {
    VisionError::Script("store lock poisoned".to_string())
}

#[async_trait::async_trait]
impl ScriptStore for MemoryStore {
    async fn read_script(&self, path: &str) -> Result<String, VisionError> {
        self.reads.lock().map_err(poisoned)?.push(path.to_string());
        self.scripts
            .lock()
            .map_err(poisoned)?
            .get(path)
            .cloned()
            .ok_or_else(|| VisionError::Script(format!("Cannot read {path}: no such script")))
    }

    async fn write_script(&self, path: &str, contents: &str) -> Result<(), VisionError> {
        self.scripts
            .lock()
            .map_err(poisoned)?
            .insert(path.to_string(), contents.to_string());
        Ok(())
    }

    async fn read_upload(&self, name: &str) -> Result<Option<String>, VisionError> {
        Ok(self.uploads.lock().map_err(poisoned)?.get(name).cloned())
    }

    async fn write_upload(&self, name: &str, contents: &str) -> Result<(), VisionError> {
        self.uploads
            .lock()
            .map_err(poisoned)?
            .insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn upload_path(&self, name: &str) -> PathBuf {
        Path::new("upload").join(name)
    }
}
