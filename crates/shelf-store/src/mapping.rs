//! Durable id -> display-name mapping.
//!
//! [`MappingStore`] keeps the mapping in a `BTreeMap` behind a `RwLock` and
//! persists it as a flat JSON object (`{"<id>": "<name>", ...}`). Lookups take
//! the read lock and may run concurrently; mutations take the write lock.
//!
//! Persistence replaces the file atomically: the snapshot is written to a
//! uniquely named temporary file next to the mapping file and renamed over
//! it. Saves are serialized by a separate mutex so the file on disk always
//! moves forward in snapshot order.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::{Deserializer as _, MapAccess, Visitor};
use serde_json::{Map, Value};
use shelf_types::{sanitize_display_name, FileId};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// In-memory id -> name map with JSON file persistence.
#[derive(Debug)]
pub struct MappingStore {
    entries: RwLock<BTreeMap<FileId, String>>,
    path: PathBuf,
    save_lock: Mutex<()>,
}

impl MappingStore {
    /// Create an empty store persisting to `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            path: path.into(),
            save_lock: Mutex::new(()),
        }
    }

    /// Create a store and [`load`](Self::load) it from `path`.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    /// Path of the persisted mapping file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory mapping with the contents of the mapping file.
    ///
    /// - A missing file is a first run: the mapping becomes empty.
    /// - In a valid JSON object, entries whose key is not a valid id or whose
    ///   value is not a string are skipped with a warning.
    /// - A file that does not parse is moved aside to `<path>.corrupt` (or
    ///   `<path>.corrupt.N` if that is taken). Every complete entry before
    ///   the first syntax error is kept, and the recovered mapping is saved
    ///   in its place.
    pub fn load(&self) -> StoreResult<()> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no mapping file; starting empty");
                self.write_entries().clear();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Map<String, Value>>(&raw) {
            Ok(object) => {
                let loaded = Self::recover_entries(object);
                debug!(path = ?self.path, entries = loaded.len(), "mapping loaded");
                *self.write_entries() = loaded;
            }
            Err(e) => {
                let backup = self.corrupt_path();
                fs::rename(&self.path, &backup)?;
                let loaded = Self::recover_entries(salvage_entries(&raw));
                warn!(
                    path = ?self.path,
                    backup = ?backup,
                    error = %e,
                    recovered = loaded.len(),
                    "mapping file is damaged; moved aside and kept entries before the error"
                );
                *self.write_entries() = loaded;
                if let Err(e) = self.save() {
                    warn!(path = ?self.path, error = %e, "failed to save recovered mapping");
                }
            }
        }
        Ok(())
    }

    /// Atomically write the current mapping to the mapping file.
    pub fn save(&self) -> StoreResult<()> {
        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (body, count) = {
            let entries = self.read_entries();
            let body = serde_json::to_vec_pretty(&*entries)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            (body, entries.len())
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = ?self.path, entries = count, "mapping saved");
        Ok(())
    }

    /// All entries, sorted by id.
    pub fn list(&self) -> Vec<(FileId, String)> {
        self.read_entries()
            .iter()
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect()
    }

    pub fn get(&self, id: &FileId) -> Option<String> {
        self.read_entries().get(id).cloned()
    }

    pub fn put(&self, id: FileId, name: String) {
        self.write_entries().insert(id, name);
    }

    /// Remove an entry, returning its name if it was present.
    pub fn remove(&self, id: &FileId) -> Option<String> {
        self.write_entries().remove(id)
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    fn recover_entries(object: Map<String, Value>) -> BTreeMap<FileId, String> {
        let mut entries = BTreeMap::new();
        for (key, value) in object {
            let id = match FileId::try_from(key) {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "skipping mapping entry with invalid id");
                    continue;
                }
            };
            match value {
                Value::String(name) => {
                    entries.insert(id, sanitize_display_name(&name));
                }
                other => {
                    warn!(%id, value = %other, "skipping mapping entry with non-string name");
                }
            }
        }
        entries
    }

    /// First of `<path>.corrupt`, `<path>.corrupt.1`, ... that does not exist.
    fn corrupt_path(&self) -> PathBuf {
        let mut base = OsString::from(self.path.as_os_str());
        base.push(".corrupt");
        let mut candidate = PathBuf::from(&base);
        let mut n = 1u32;
        while fs::symlink_metadata(&candidate).is_ok() {
            let mut name = base.clone();
            name.push(format!(".{n}"));
            candidate = PathBuf::from(name);
            n += 1;
        }
        candidate
    }

    // Every critical section is a single map operation, so a panic while
    // holding the lock cannot leave the map half-updated.
    fn read_entries(&self) -> RwLockReadGuard<'_, BTreeMap<FileId, String>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, BTreeMap<FileId, String>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Entries of a damaged JSON object, read in order up to the first error.
fn salvage_entries(raw: &[u8]) -> Map<String, Value> {
    let mut entries = Map::new();
    let mut de = serde_json::Deserializer::from_slice(raw);
    if let Err(e) = (&mut de).deserialize_map(EntriesUntilError(&mut entries)) {
        debug!(error = %e, salvaged = entries.len(), "stopped reading damaged mapping");
    }
    entries
}

struct EntriesUntilError<'a>(&'a mut Map<String, Value>);

impl<'de> Visitor<'de> for EntriesUntilError<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object of id -> name")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value::<Value>()?;
            self.0.insert(key, value);
        }
        Ok(())
    }
}
