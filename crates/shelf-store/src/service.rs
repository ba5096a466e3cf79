//! The storage facade called by request handlers.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use shelf_types::{sanitize_display_name, FileId, IdGenerator, RandomIdGenerator};
use tracing::{debug, info, warn};

use crate::blob::FsBlobStore;
use crate::config::StorageConfig;
use crate::error::{PersistenceWarning, StoreError, StoreResult};
use crate::mapping::MappingStore;

/// How many candidate ids `add` tries before giving up.
pub const MAX_ID_ATTEMPTS: usize = 10;

/// Result of a mutation that completed, possibly with a stale mapping file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    /// Set when the mapping could not be persisted after the blob mutation.
    pub warning: Option<PersistenceWarning>,
}

impl<T> Outcome<T> {
    /// Returns `true` if the mapping file is up to date.
    pub fn is_clean(&self) -> bool {
        self.warning.is_none()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Composes id allocation, blob storage and the name mapping.
///
/// One instance is shared (behind an `Arc`) by every request handler. All
/// shared mutable state lives inside the [`MappingStore`] lock and the
/// filesystem.
pub struct StorageService {
    config: StorageConfig,
    blobs: FsBlobStore,
    mapping: MappingStore,
    ids: Box<dyn IdGenerator>,
}

impl StorageService {
    /// Prepare the storage directories and load the mapping.
    pub fn open(config: StorageConfig) -> StoreResult<Self> {
        Self::with_generator(config, Box::new(RandomIdGenerator::default()))
    }

    /// Like [`open`](Self::open), drawing candidate ids from `ids`.
    pub fn with_generator(config: StorageConfig, ids: Box<dyn IdGenerator>) -> StoreResult<Self> {
        fs::create_dir_all(&config.resources_dir).map_err(|e| {
            StoreError::Config(format!(
                "cannot create resources directory {}: {e}",
                config.resources_dir.display()
            ))
        })?;
        if let Some(parent) = config.mapping_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Config(format!(
                        "cannot create mapping directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let mapping = MappingStore::open(config.mapping_path.clone())?;
        info!(
            resources_dir = ?config.resources_dir,
            mapping_path = ?config.mapping_path,
            max_file_size = config.max_file_size,
            files = mapping.len(),
            "storage opened"
        );

        Ok(Self {
            blobs: FsBlobStore::new(config.resources_dir.clone()),
            config,
            mapping,
            ids,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Store `content` under a fresh id and record `display_name` for it.
    ///
    /// Fails without side effects if the content is over the size limit or
    /// the blob cannot be written. Once the blob is stored the call succeeds;
    /// a failure to persist the mapping is returned as a warning.
    pub fn add(&self, content: &[u8], display_name: &str) -> StoreResult<Outcome<FileId>> {
        let size = content.len() as u64;
        if self.config.exceeds_limit(size) {
            return Err(StoreError::SizeLimitExceeded {
                size,
                limit: self.config.max_file_size,
            });
        }

        let id = self.store_blob(content)?;
        let name = sanitize_display_name(display_name);
        self.mapping.put(id.clone(), name.clone());
        let warning = self.persist();

        info!(%id, name = %name, size, "file added");
        Ok(Outcome { value: id, warning })
    }

    /// Add a local file, named after its final path component.
    ///
    /// Returns the new id and the display name as stored.
    pub fn add_path(&self, path: &Path) -> StoreResult<Outcome<(FileId, String)>> {
        let meta = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(StoreError::NotFound(path.display().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if self.config.exceeds_limit(meta.len()) {
            return Err(StoreError::SizeLimitExceeded {
                size: meta.len(),
                limit: self.config.max_file_size,
            });
        }

        let content = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let outcome = self.add(&content, &name)?;
        Ok(Outcome {
            value: (outcome.value, sanitize_display_name(&name)),
            warning: outcome.warning,
        })
    }

    /// Location and display name of the file stored under `id`.
    pub fn get(&self, id: &str) -> StoreResult<(PathBuf, String)> {
        let id = parse_id(id)?;
        let name = self
            .mapping
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let path = self
            .blobs
            .path_for(id.as_str())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok((path, name))
    }

    /// Content and display name of the file stored under `id`.
    pub fn read(&self, id: &str) -> StoreResult<(Vec<u8>, String)> {
        let id = parse_id(id)?;
        let name = self
            .mapping
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let content = self.blobs.read(&id)?;
        Ok((content, name))
    }

    /// All stored files as `(id, display name)`, sorted by id.
    pub fn list(&self) -> Vec<(FileId, String)> {
        self.mapping.list()
    }

    /// Delete the file stored under `id` and its mapping entry.
    ///
    /// Like [`add`](Self::add), a mapping persistence failure after the file
    /// is gone is reported as a warning, not an error.
    pub fn delete(&self, id: &str) -> StoreResult<Outcome<()>> {
        let id = parse_id(id)?;
        if !self.blobs.exists(&id) {
            return Err(StoreError::NotFound(id.to_string()));
        }

        self.blobs.remove(&id)?;
        self.mapping.remove(&id);
        let warning = self.persist();

        info!(%id, "file deleted");
        Ok(Outcome { value: (), warning })
    }

    fn store_blob(&self, content: &[u8]) -> StoreResult<FileId> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let candidate = self.ids.generate();
            if self.blobs.exists(&candidate) {
                debug!(id = %candidate, attempt, "candidate id taken");
                continue;
            }
            match self.blobs.write_new(&candidate, content) {
                Ok(()) => return Ok(candidate),
                Err(StoreError::IdCollision(id)) => {
                    debug!(%id, attempt, "candidate id claimed concurrently");
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::IdExhaustion {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    fn persist(&self) -> Option<PersistenceWarning> {
        match self.mapping.save() {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    path = ?self.mapping.path(),
                    error = %e,
                    "mapping not persisted; file on disk lags behind memory"
                );
                Some(PersistenceWarning::from_error(&e))
            }
        }
    }
}

impl fmt::Debug for StorageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageService")
            .field("config", &self.config)
            .field("file_count", &self.mapping.len())
            .finish()
    }
}

fn parse_id(id: &str) -> StoreResult<FileId> {
    FileId::parse(id).map_err(|_| StoreError::NotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shelf_types::is_valid_id;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Hands out a fixed sequence of ids, then repeats the last one.
    struct SequenceIds(Mutex<Vec<FileId>>);

    impl SequenceIds {
        fn new(ids: &[&str]) -> Box<Self> {
            let mut ids: Vec<FileId> = ids.iter().map(|s| FileId::parse(s).unwrap()).collect();
            ids.reverse();
            Box::new(Self(Mutex::new(ids)))
        }
    }

    impl IdGenerator for SequenceIds {
        fn generate(&self) -> FileId {
            let mut ids = self.0.lock().unwrap();
            if ids.len() > 1 {
                ids.pop().unwrap()
            } else {
                ids[0].clone()
            }
        }
    }

    fn config_in(dir: &Path, max_file_size: u64) -> StorageConfig {
        StorageConfig {
            resources_dir: dir.join("resources"),
            mapping_path: dir.join("mapping.json"),
            max_file_size,
        }
    }

    fn temp_service(max_file_size: u64) -> (tempfile::TempDir, StorageService) {
        let dir = tempfile::tempdir().unwrap();
        let service = StorageService::open(config_in(dir.path(), max_file_size)).unwrap();
        (dir, service)
    }

    fn resource_entries(service: &StorageService) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&service.config().resources_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // -----------------------------------------------------------------------
    // Open
    // -----------------------------------------------------------------------

    #[test]
    fn open_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            resources_dir: dir.path().join("a").join("resources"),
            mapping_path: dir.path().join("meta").join("mapping.json"),
            max_file_size: 0,
        };
        let service = StorageService::open(config).unwrap();
        assert!(service.config().resources_dir.is_dir());
        assert!(dir.path().join("meta").is_dir());
        assert!(service.list().is_empty());
    }

    #[test]
    fn open_fails_when_resources_dir_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let config = StorageConfig {
            resources_dir: blocker.join("resources"),
            mapping_path: dir.path().join("mapping.json"),
            max_file_size: 0,
        };
        let err = StorageService::open(config).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    // -----------------------------------------------------------------------
    // Add / get
    // -----------------------------------------------------------------------

    #[test]
    fn add_hello_world() {
        let (_dir, service) = temp_service(0);
        let outcome = service.add(b"hi", "hello.txt").unwrap();
        assert!(outcome.is_clean());

        let id = outcome.into_value();
        assert_eq!(id.as_str().len(), 22);
        assert!(is_valid_id(id.as_str()));
        assert_eq!(service.list(), vec![(id.clone(), "hello.txt".to_string())]);
        assert_eq!(resource_entries(&service), vec![id.to_string()]);
    }

    #[test]
    fn add_then_read_round_trip() {
        let (_dir, service) = temp_service(0);
        let id = service.add(b"\x00\x01binary\xff", "data.bin").unwrap().value;

        let (path, name) = service.get(id.as_str()).unwrap();
        assert_eq!(name, "data.bin");
        assert_eq!(fs::read(path).unwrap(), b"\x00\x01binary\xff");

        let (content, name) = service.read(id.as_str()).unwrap();
        assert_eq!(content, b"\x00\x01binary\xff");
        assert_eq!(name, "data.bin");
    }

    #[test]
    fn add_sanitizes_display_name() {
        let (_dir, service) = temp_service(0);
        let id = service.add(b"x", "a\"b\\c\td.txt").unwrap().value;
        assert_eq!(service.get(id.as_str()).unwrap().1, "a_b_c_d.txt");
    }

    #[test]
    fn add_over_limit_leaves_no_trace() {
        let (dir, service) = temp_service(1);
        let err = service.add(b"ab", "x").unwrap_err();
        assert!(matches!(err, StoreError::SizeLimitExceeded { size: 2, limit: 1 }));
        assert!(service.list().is_empty());
        assert!(resource_entries(&service).is_empty());
        // Nothing was mutated, so nothing was persisted either.
        assert!(!dir.path().join("mapping.json").exists());
    }

    #[test]
    fn add_at_limit_is_accepted() {
        let (_dir, service) = temp_service(2);
        assert!(service.add(b"ab", "x").is_ok());
    }

    #[test]
    fn add_skips_taken_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 0);
        let ids = SequenceIds::new(&["taken1", "taken1", "fresh1"]);
        let service = StorageService::with_generator(config, ids).unwrap();

        assert_eq!(service.add(b"a", "a").unwrap().value.as_str(), "taken1");
        assert_eq!(service.add(b"b", "b").unwrap().value.as_str(), "fresh1");
        assert_eq!(service.read("taken1").unwrap().0, b"a");
        assert_eq!(service.read("fresh1").unwrap().0, b"b");
    }

    #[test]
    fn add_exhausts_ids() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 0);
        let service =
            StorageService::with_generator(config, SequenceIds::new(&["always"])).unwrap();

        service.add(b"first", "first").unwrap();
        let err = service.add(b"second", "second").unwrap_err();
        assert!(matches!(
            err,
            StoreError::IdExhaustion {
                attempts: MAX_ID_ATTEMPTS
            }
        ));
        assert_eq!(service.list().len(), 1);
        assert_eq!(resource_entries(&service), vec!["always"]);
    }

    #[test]
    fn add_reports_persistence_warning() {
        let (dir, service) = temp_service(0);
        fs::create_dir(dir.path().join("mapping.json")).unwrap();

        let outcome = service.add(b"kept", "kept.txt").unwrap();
        assert!(!outcome.is_clean());
        // Still retrievable through the in-memory mapping.
        let (content, name) = service.read(outcome.value.as_str()).unwrap();
        assert_eq!(content, b"kept");
        assert_eq!(name, "kept.txt");
    }

    #[test]
    fn add_fails_when_blob_cannot_be_written() {
        let (_dir, service) = temp_service(0);
        fs::remove_dir(&service.config().resources_dir).unwrap();

        let err = service.add(b"x", "x").unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(service.list().is_empty());
    }

    #[test]
    fn add_path_uses_file_name() {
        let (dir, service) = temp_service(0);
        let src = dir.path().join("report \"final\".pdf");
        fs::write(&src, b"%PDF").unwrap();

        let outcome = service.add_path(&src).unwrap();
        let (id, name) = outcome.value;
        assert_eq!(name, "report _final_.pdf");
        assert_eq!(service.read(id.as_str()).unwrap(), (b"%PDF".to_vec(), name));
    }

    #[test]
    fn add_path_checks_size_before_reading() {
        let (dir, service) = temp_service(3);
        let src = dir.path().join("big.bin");
        fs::write(&src, b"0123456789").unwrap();

        assert!(matches!(
            service.add_path(&src),
            Err(StoreError::SizeLimitExceeded { size: 10, limit: 3 })
        ));
        assert!(resource_entries(&service).is_empty());
    }

    #[test]
    fn add_path_missing_source() {
        let (dir, service) = temp_service(0);
        assert!(matches!(
            service.add_path(&dir.path().join("nope.txt")),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            service.add_path(dir.path()),
            Err(StoreError::NotFound(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    #[test]
    fn get_rejects_traversal() {
        let (dir, service) = temp_service(0);
        fs::write(dir.path().join("secret"), b"top secret").unwrap();

        for id in ["../secret", "../etc/passwd", "a/b", "", "mapping.json"] {
            assert!(
                matches!(service.get(id), Err(StoreError::NotFound(_))),
                "expected NotFound for {id:?}"
            );
            assert!(matches!(service.read(id), Err(StoreError::NotFound(_))));
        }
    }

    #[test]
    fn get_unknown_id() {
        let (_dir, service) = temp_service(0);
        assert!(matches!(service.get("abcdef"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn get_requires_blob_file() {
        let (_dir, service) = temp_service(0);
        let id = service.add(b"x", "x").unwrap().value;
        fs::remove_file(service.config().resources_dir.join(id.as_str())).unwrap();
        assert!(matches!(service.get(id.as_str()), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn get_requires_mapping_entry() {
        let (_dir, service) = temp_service(0);
        fs::write(service.config().resources_dir.join("orphan1"), b"x").unwrap();
        assert!(matches!(service.get("orphan1"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn list_sorted_regardless_of_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path(), 0);
        let service = StorageService::with_generator(
            config,
            SequenceIds::new(&["zzzzzz", "000000", "MMMMMM", "aaaaaa"]),
        )
        .unwrap();
        for name in ["z", "0", "M", "a"] {
            service.add(name.as_bytes(), name).unwrap();
        }

        let ids: Vec<String> = service.list().into_iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(ids, vec!["000000", "MMMMMM", "aaaaaa", "zzzzzz"]);
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    #[test]
    fn add_then_delete() {
        let (_dir, service) = temp_service(0);
        let id = service.add(b"bye", "bye.txt").unwrap().value;

        let outcome = service.delete(id.as_str()).unwrap();
        assert!(outcome.is_clean());
        assert!(service.list().is_empty());
        assert!(matches!(service.get(id.as_str()), Err(StoreError::NotFound(_))));
        assert!(resource_entries(&service).is_empty());
    }

    #[test]
    fn delete_invalid_or_missing() {
        let (_dir, service) = temp_service(0);
        assert!(matches!(service.delete("../x"), Err(StoreError::NotFound(_))));
        assert!(matches!(service.delete("abcdef"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn delete_twice() {
        let (_dir, service) = temp_service(0);
        let id = service.add(b"x", "x").unwrap().value;
        service.delete(id.as_str()).unwrap();
        assert!(matches!(service.delete(id.as_str()), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn delete_reports_persistence_warning() {
        let (dir, service) = temp_service(0);
        let id = service.add(b"x", "x.txt").unwrap().value;
        let mapping_path = dir.path().join("mapping.json");
        fs::remove_file(&mapping_path).unwrap();
        fs::create_dir(&mapping_path).unwrap();

        let outcome = service.delete(id.as_str()).unwrap();
        assert!(!outcome.is_clean());
        assert!(service.list().is_empty());
        assert!(resource_entries(&service).is_empty());
    }

    // -----------------------------------------------------------------------
    // Persistence across restarts
    // -----------------------------------------------------------------------

    #[test]
    fn restart_preserves_listing() {
        let dir = tempfile::tempdir().unwrap();
        let before = {
            let service = StorageService::open(config_in(dir.path(), 0)).unwrap();
            service.add(b"one", "one.txt").unwrap();
            service.add(b"two", "two.txt").unwrap();
            let gone = service.add(b"three", "three.txt").unwrap().value;
            service.delete(gone.as_str()).unwrap();
            service.list()
        };

        let service = StorageService::open(config_in(dir.path(), 0)).unwrap();
        assert_eq!(service.list(), before);
        assert_eq!(service.list().len(), 2);
        for (id, _) in service.list() {
            assert!(service.get(id.as_str()).is_ok());
        }
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_adds_produce_distinct_ids() {
        let (dir, service) = temp_service(0);
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    (0..10)
                        .map(|i| {
                            let body = format!("{t}-{i}");
                            let id = service.add(body.as_bytes(), &body).unwrap().value;
                            (id, body)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for (id, body) in h.join().expect("thread should not panic") {
                assert_eq!(service.read(id.as_str()).unwrap().0, body.as_bytes());
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 80);

        let reopened = StorageService::open(config_in(dir.path(), 0)).unwrap();
        assert_eq!(reopened.list(), service.list());
        assert_eq!(resource_entries(&reopened).len(), 80);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn round_trip_any_content(
            content in proptest::collection::vec(any::<u8>(), 0..2048),
            name in "\\PC{0,40}",
        ) {
            let (_dir, service) = temp_service(0);
            let id = service.add(&content, &name).unwrap().value;
            prop_assert!(is_valid_id(id.as_str()));

            let (read_back, stored_name) = service.read(id.as_str()).unwrap();
            prop_assert_eq!(read_back, content);
            prop_assert_eq!(stored_name, sanitize_display_name(&name));
        }
    }
}
