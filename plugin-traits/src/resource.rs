//! Loaded song resources.
//!
//! A [`Resource`] is whatever a provider has to prepare before a song can be
//! played: a downloaded file, an open stream handle, nothing at all. The
//! resource cache owns resources and frees them when they are evicted.

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Pre-loaded data required to play a song.
///
/// A resource is valid until it is freed; a freed resource never becomes
/// valid again. Implementations guard `free` with an internal flag so a
/// second call does not release anything twice.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Release the underlying data. Safe to call more than once.
    async fn free(&self) -> Result<()>;

    /// Whether the resource can still be used to create a playback.
    ///
    /// Returns `false` once freed, or if the backing data became unusable
    /// independently (e.g. the file was deleted).
    fn is_valid(&self) -> bool;
}

/// Resource for providers that need no preparation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResource;

#[async_trait]
impl Resource for NoResource {
    async fn free(&self) -> Result<()> {
        Ok(())
    }

    fn is_valid(&self) -> bool {
        true
    }
}

/// A song downloaded to a local file. Freeing deletes the file.
#[derive(Debug)]
pub struct FileResource {
    path: PathBuf,
    freed: AtomicBool,
    release: Mutex<()>,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            freed: AtomicBool::new(false),
            release: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Resource for FileResource {
    async fn free(&self) -> Result<()> {
        let _guard = self.release.lock().await;
        if self.freed.load(Ordering::Acquire) {
            return Ok(());
        }

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Deleted song file"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Song file already gone")
            }
            Err(err) => return Err(err.into()),
        }

        self.freed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.freed.load(Ordering::Acquire) && self.path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file() -> PathBuf {
        let path = std::env::temp_dir().join(format!("song-{}.mp3", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"audio").unwrap();
        path
    }

    #[tokio::test]
    async fn test_no_resource_is_always_valid() {
        let resource = NoResource;
        resource.free().await.unwrap();
        assert!(resource.is_valid());
    }

    #[tokio::test]
    async fn test_file_resource_free_deletes_file() {
        let path = temp_file();
        let resource = FileResource::new(&path);
        assert!(resource.is_valid());

        resource.free().await.unwrap();
        assert!(!resource.is_valid());
        assert!(!path.exists());

        // second free is a no-op
        resource.free().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_resource_invalid_when_file_disappears() {
        let path = temp_file();
        let resource = FileResource::new(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(!resource.is_valid());
        resource.free().await.unwrap();
    }
}
