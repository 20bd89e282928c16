use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Where published photos go. `put` returns the public URL of the stored bytes.
pub trait PhotoStore: Send + Sync {
    fn put(&self, bytes: &[u8]) -> Result<String>;
}

/// Writes each photo as `<uuid>.jpg` under a directory.
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PhotoStore for LocalDirStore {
    fn put(&self, bytes: &[u8]) -> Result<String> {
        let path = self.root.join(format!("{}.jpg", Uuid::new_v4()));
        fs::write(&path, bytes)?;
        log::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!("file://{}", path.to_string_lossy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_writes_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path().join("published")).unwrap();
        let first = store.put(b"one").unwrap();
        let second = store.put(b"two").unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("file://"));

        let path = PathBuf::from(first.trim_start_matches("file://"));
        assert_eq!(fs::read(&path).unwrap(), b"one");
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 2);
    }
}
