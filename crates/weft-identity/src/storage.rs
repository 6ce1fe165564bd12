//! Byte-blob storage abstraction.
//!
//! Credentials and the authority hierarchy read and write PEM material
//! through this trait and stay agnostic to whether the backing store is a
//! local disk, an object store, or test memory. The contract is a plain
//! blocking call: call, get bytes or an error.

use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A blocking byte-blob store addressed by slash-separated paths.
pub trait Storage: Send + Sync {
    /// Whether a blob exists at `path`.
    fn exists(&self, path: &str) -> Result<bool>;

    /// Reads the blob at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when absent, [`Error::Io`] on backend failure.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Writes (or replaces) the blob at `path`.
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;
}

/// Storage backed by a local directory.
#[derive(Debug)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Creates a disk store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty() && *p != "..") {
            full.push(part);
        }
        full
    }
}

impl Storage for DiskStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path).exists())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        if !full.exists() {
            return Err(Error::NotFound {
                path: path.to_string(),
            });
        }
        Ok(std::fs::read(full)?)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, data)?;
        Ok(())
    }
}

impl AsRef<Path> for DiskStorage {
    fn as_ref(&self) -> &Path {
        &self.root
    }
}

/// In-memory storage for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.blobs.lock().expect("storage lock").contains_key(path))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .expect("storage lock")
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                path: path.to_string(),
            })
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.blobs
            .lock()
            .expect("storage lock")
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }
}
