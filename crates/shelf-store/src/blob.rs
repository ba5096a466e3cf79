//! Filesystem blob store.
//!
//! Layout: one file per blob, directly inside the root directory, named
//! exactly by its [`FileId`]. While a blob is being written it lives at
//! `{id}.tmp`; a `.tmp` name can never collide with a live blob because ids
//! contain no dots.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use shelf_types::FileId;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Write-once blob storage rooted at a directory.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Blob store over `root`. The directory is not created here; see
    /// [`StorageService::open`](crate::StorageService::open).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory holding the blobs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if a blob is stored under `id`.
    pub fn exists(&self, id: &FileId) -> bool {
        self.blob_path(id).is_file()
    }

    /// Location of the blob named by an untrusted id string.
    ///
    /// Returns `None` unless `id` is a valid identifier and the file exists,
    /// so the result never points outside the root directory.
    pub fn path_for(&self, id: &str) -> Option<PathBuf> {
        let id = FileId::parse(id).ok()?;
        let path = self.blob_path(&id);
        path.is_file().then_some(path)
    }

    /// Store `content` under `id`.
    ///
    /// The content is written to `{id}.tmp` and renamed to `{id}` only once
    /// it is complete and synced. The temporary file is created exclusively,
    /// and the final name is checked again before the rename, so two writers
    /// racing on the same id cannot both succeed: the loser gets
    /// [`StoreError::IdCollision`] and leaves nothing behind.
    pub fn write_new(&self, id: &FileId, content: &[u8]) -> StoreResult<()> {
        let tmp = self.temp_path(id);
        let file = match OpenOptions::new().write(true).create_new(true).open(&tmp) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::IdCollision(id.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let result = self.publish(file, &tmp, id, content);
        if result.is_err() {
            if let Err(e) = fs::remove_file(&tmp) {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(path = ?tmp, error = %e, "failed to clean up temporary blob");
                }
            }
        }
        result
    }

    /// Read the full content of a blob.
    pub fn read(&self, id: &FileId) -> StoreResult<Vec<u8>> {
        fs::read(self.blob_path(id)).map_err(|e| not_found_or_io(e, id))
    }

    /// Delete the blob stored under `id`.
    pub fn remove(&self, id: &FileId) -> StoreResult<()> {
        fs::remove_file(self.blob_path(id)).map_err(|e| not_found_or_io(e, id))?;
        debug!(%id, "blob removed");
        Ok(())
    }

    fn publish(&self, mut file: File, tmp: &Path, id: &FileId, content: &[u8]) -> StoreResult<()> {
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);

        let dest = self.blob_path(id);
        if dest.exists() {
            return Err(StoreError::IdCollision(id.clone()));
        }
        fs::rename(tmp, &dest)?;

        debug!(%id, len = content.len(), "blob written");
        Ok(())
    }

    fn blob_path(&self, id: &FileId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn temp_path(&self, id: &FileId) -> PathBuf {
        self.root.join(format!("{id}.tmp"))
    }
}

fn not_found_or_io(err: io::Error, id: &FileId) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(id.to_string())
    } else {
        StoreError::Io(err)
    }
}
