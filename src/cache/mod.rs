//! Typed on-disk artifact cache with a byte budget.
//!
//! Layout: one directory per [`ArtifactKind`] under the cache root, and per key a
//! `<key>.bin` data file plus a `<key>.meta.json` sidecar. Writes go to a temp
//! file and are renamed into place, so readers never see a partial entry.
//!
//! Every I/O failure is logged and reported as a miss or `false`; callers fall
//! back to the network instead of failing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::TubeScribeError;

pub mod eviction;

pub use eviction::{sweep, SweepReport, EVICTION_TARGET_RATIO};

/// Default cache budget (500 MB)
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 500 * 1024 * 1024;

const DATA_EXTENSION: &str = "bin";
const SIDECAR_SUFFIX: &str = ".meta.json";
const TEMP_PREFIX: &str = ".tmp-";

/// Temp files older than this belong to no live write
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(60);

/// Kinds of artifacts the cache holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Transcript,
    Index,
    Metadata,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Transcript,
        ArtifactKind::Index,
        ArtifactKind::Metadata,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Transcript => "transcripts",
            ArtifactKind::Index => "indexes",
            ArtifactKind::Metadata => "metadata",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Transcript => "transcript",
            ArtifactKind::Index => "index",
            ArtifactKind::Metadata => "metadata",
        }
    }
}

/// Cache key derived from a canonical video id.
///
/// The file name is a truncated SHA-256 of the id; the id itself travels in the
/// sidecar and is checked on every read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: String,
    canonical_id: String,
}

impl CacheKey {
    pub fn for_identity(canonical_id: &str) -> Self {
        let digest = Sha256::digest(canonical_id.as_bytes());
        Self {
            hash: hex::encode(&digest[..16]),
            canonical_id: canonical_id.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }

    pub fn canonical_id(&self) -> &str {
        &self.canonical_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    key: String,
    canonical_id: String,
    kind: ArtifactKind,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

/// One stored artifact as seen on disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: String,
    pub canonical_id: Option<String>,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Data file plus sidecar
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Aggregate usage of the cache directory
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_bytes: u64,
    pub file_count: u64,
    pub max_bytes: u64,
    pub usage_percent: f64,
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> TubeScribeError + '_ {
    move |source| TubeScribeError::CacheIo {
        path: path.to_path_buf(),
        source,
    }
}

fn is_not_found(error: &TubeScribeError) -> bool {
    matches!(error, TubeScribeError::CacheIo { source, .. } if source.kind() == io::ErrorKind::NotFound)
}

/// Write to a temp file in the same directory, then rename over `path`
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), TubeScribeError> {
    let parent = path.parent().ok_or_else(|| TubeScribeError::CacheIo {
        path: path.to_path_buf(),
        source: io::Error::other("no parent directory"),
    })?;

    let tmp_path = parent.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));
    let result = write_and_sync(&tmp_path, content)
        .map_err(io_error(&tmp_path))
        .and_then(|()| fs_err::rename(&tmp_path, path).map_err(io_error(path)));

    if result.is_err() {
        let _ = fs_err::remove_file(&tmp_path);
    }
    result
}

fn write_and_sync(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = fs_err::File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

/// Remove a file, returning its size. A missing file frees nothing.
fn remove_counted(path: &Path) -> Result<u64, TubeScribeError> {
    let len = fs_err::metadata(path).map(|m| m.len()).unwrap_or(0);
    match fs_err::remove_file(path) {
        Ok(()) => Ok(len),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(source) => Err(TubeScribeError::CacheIo {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Filesystem-backed artifact cache
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    max_bytes: u64,
}

impl CacheStore {
    /// Open (and create if needed) a cache rooted at `root`
    pub fn open(root: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, TubeScribeError> {
        let store = Self {
            root: root.into(),
            max_bytes,
        };
        store.ensure_directories()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn ensure_directories(&self) -> Result<(), TubeScribeError> {
        for kind in ArtifactKind::ALL {
            let dir = self.kind_dir(kind);
            fs_err::create_dir_all(&dir).map_err(io_error(&dir))?;
        }
        Ok(())
    }

    fn kind_dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    fn data_path(&self, key: &str, kind: ArtifactKind) -> PathBuf {
        self.kind_dir(kind).join(format!("{}.{}", key, DATA_EXTENSION))
    }

    fn sidecar_path(&self, key: &str, kind: ArtifactKind) -> PathBuf {
        self.kind_dir(kind).join(format!("{}{}", key, SIDECAR_SUFFIX))
    }

    /// Read an artifact. `None` covers absence, corruption and I/O failure alike.
    pub fn get(&self, key: &CacheKey, kind: ArtifactKind) -> Option<Vec<u8>> {
        match self.try_get(key, kind) {
            Ok(bytes) => bytes,
            Err(e) if is_not_found(&e) => None,
            Err(e) => {
                tracing::warn!("Cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    fn try_get(&self, key: &CacheKey, kind: ArtifactKind) -> Result<Option<Vec<u8>>, TubeScribeError> {
        let sidecar_path = self.sidecar_path(key.as_str(), kind);
        let raw = fs_err::read(&sidecar_path).map_err(io_error(&sidecar_path))?;
        let sidecar: Sidecar = serde_json::from_slice(&raw)
            .map_err(|e| TubeScribeError::CacheCorrupt(format!("{}: {}", sidecar_path.display(), e)))?;

        if sidecar.canonical_id != key.canonical_id() {
            tracing::warn!(
                "Cache key {} belongs to {}, not {}",
                key.as_str(),
                sidecar.canonical_id,
                key.canonical_id()
            );
            return Ok(None);
        }

        let data_path = self.data_path(key.as_str(), kind);
        let bytes = fs_err::read(&data_path).map_err(io_error(&data_path))?;
        if bytes.len() as u64 != sidecar.size_bytes {
            return Err(TubeScribeError::CacheCorrupt(format!(
                "{} is {} bytes, sidecar says {}",
                data_path.display(),
                bytes.len(),
                sidecar.size_bytes
            )));
        }

        tracing::debug!("Cache hit: {} {}", kind.as_str(), key.canonical_id());
        Ok(Some(bytes))
    }

    pub fn contains(&self, key: &CacheKey, kind: ArtifactKind) -> bool {
        self.data_path(key.as_str(), kind).exists() && self.sidecar_path(key.as_str(), kind).exists()
    }

    /// Store an artifact, replacing any previous one for `(key, kind)`, then run an
    /// eviction sweep. Returns false if the write failed.
    pub fn put(&self, key: &CacheKey, kind: ArtifactKind, bytes: &[u8]) -> bool {
        if let Err(e) = self.try_put(key, kind, bytes) {
            tracing::warn!("Cache write failed for {}: {}", key.canonical_id(), e);
            return false;
        }

        tracing::debug!(
            "Cached {} for {} ({} bytes)",
            kind.as_str(),
            key.canonical_id(),
            bytes.len()
        );
        sweep(self, self.max_bytes);
        true
    }

    fn try_put(&self, key: &CacheKey, kind: ArtifactKind, bytes: &[u8]) -> Result<(), TubeScribeError> {
        let dir = self.kind_dir(kind);
        fs_err::create_dir_all(&dir).map_err(io_error(&dir))?;

        let sidecar = Sidecar {
            key: key.as_str().to_string(),
            canonical_id: key.canonical_id().to_string(),
            kind,
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        };
        let sidecar_bytes = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| TubeScribeError::CacheCorrupt(e.to_string()))?;

        write_atomic(&self.data_path(key.as_str(), kind), bytes)?;
        write_atomic(&self.sidecar_path(key.as_str(), kind), &sidecar_bytes)?;
        Ok(())
    }

    /// Remove every artifact kind stored for `key`
    pub fn delete(&self, key: &CacheKey) -> bool {
        let mut ok = true;
        for kind in ArtifactKind::ALL {
            for path in [
                self.data_path(key.as_str(), kind),
                self.sidecar_path(key.as_str(), kind),
            ] {
                match fs_err::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!("Could not delete cache file: {}", e);
                        ok = false;
                    }
                }
            }
        }

        if ok {
            tracing::info!("Cache deleted for video {}", key.canonical_id());
        }
        ok
    }

    /// Size and file count of everything under the cache root
    pub fn stats(&self) -> CacheStats {
        let mut total_bytes = 0;
        let mut file_count = 0;

        for kind in ArtifactKind::ALL {
            let dir = self.kind_dir(kind);
            let entries = match fs_err::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    if e.kind() != io::ErrorKind::NotFound {
                        tracing::warn!("Could not read cache directory: {}", e);
                    }
                    continue;
                }
            };

            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    if metadata.is_file() {
                        total_bytes += metadata.len();
                        file_count += 1;
                    }
                }
            }
        }

        let usage_percent = if self.max_bytes == 0 {
            0.0
        } else {
            ((total_bytes as f64 / self.max_bytes as f64) * 10000.0).round() / 100.0
        };

        CacheStats {
            total_bytes,
            file_count,
            max_bytes: self.max_bytes,
            usage_percent,
        }
    }

    /// All entries across every kind, in no particular order
    pub fn list_entries(&self) -> Vec<CacheEntry> {
        let mut entries = Vec::new();

        for kind in ArtifactKind::ALL {
            let dir = self.kind_dir(kind);
            let listing = match fs_err::read_dir(&dir) {
                Ok(listing) => listing,
                Err(_) => continue,
            };

            for dir_entry in listing.flatten() {
                let path = dir_entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(DATA_EXTENSION) {
                    continue;
                }
                let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(|s| s.to_string()) else {
                    continue;
                };
                if let Some(entry) = self.describe_entry(&key, kind, path) {
                    entries.push(entry);
                }
            }
        }

        entries
    }

    fn describe_entry(&self, key: &str, kind: ArtifactKind, path: PathBuf) -> Option<CacheEntry> {
        let metadata = fs_err::metadata(&path).ok().filter(|m| m.is_file())?;
        let modified_at: DateTime<Utc> = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH).into();
        let last_accessed_at = metadata.accessed().ok().map(DateTime::<Utc>::from);

        let sidecar_path = self.sidecar_path(key, kind);
        let sidecar_len = fs_err::metadata(&sidecar_path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .unwrap_or(0);
        let sidecar: Option<Sidecar> = fs_err::read(&sidecar_path)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok());

        Some(CacheEntry {
            key: key.to_string(),
            canonical_id: sidecar.as_ref().map(|s| s.canonical_id.clone()),
            kind,
            path,
            size_bytes: metadata.len() + sidecar_len,
            created_at: sidecar.map(|s| s.created_at).unwrap_or(modified_at),
            modified_at,
            last_accessed_at,
        })
    }

    /// Delete one entry's data file, then its sidecar. Returns the bytes freed
    /// even when the second removal fails.
    pub(crate) fn remove_entry(&self, entry: &CacheEntry) -> (u64, Result<(), TubeScribeError>) {
        let mut freed = 0;
        for path in [entry.path.clone(), self.sidecar_path(&entry.key, entry.kind)] {
            match remove_counted(&path) {
                Ok(len) => freed += len,
                Err(e) => return (freed, Err(e)),
            }
        }
        (freed, Ok(()))
    }

    /// Delete files no entry owns: sidecars whose data file is gone, and temp
    /// files older than `max_temp_age`. Returns the bytes freed.
    pub(crate) fn remove_orphans(&self, max_temp_age: Duration) -> u64 {
        let now = SystemTime::now();
        let mut freed = 0;

        for kind in ArtifactKind::ALL {
            let Ok(listing) = fs_err::read_dir(self.kind_dir(kind)) else {
                continue;
            };

            for dir_entry in listing.flatten() {
                let path = dir_entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()).map(|n| n.to_string()) else {
                    continue;
                };
                let Ok(metadata) = dir_entry.metadata() else {
                    continue;
                };
                if !metadata.is_file() {
                    continue;
                }

                let orphan = if name.starts_with(TEMP_PREFIX) {
                    let age = metadata
                        .modified()
                        .ok()
                        .and_then(|modified| now.duration_since(modified).ok())
                        .unwrap_or_default();
                    age >= max_temp_age
                } else if let Some(key) = name.strip_suffix(SIDECAR_SUFFIX) {
                    !self.data_path(key, kind).exists()
                } else {
                    false
                };
                if !orphan {
                    continue;
                }

                match remove_counted(&path) {
                    Ok(len) => {
                        tracing::debug!("Removed orphaned cache file {}", path.display());
                        freed += len;
                    }
                    Err(e) => tracing::warn!("Could not remove orphaned cache file: {}", e),
                }
            }
        }

        freed
    }

    /// Remove everything and recreate the empty layout
    pub fn clear(&self) -> bool {
        for kind in ArtifactKind::ALL {
            let dir = self.kind_dir(kind);
            match fs_err::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::error!("Error clearing cache: {}", e);
                    return false;
                }
            }
        }

        match self.ensure_directories() {
            Ok(()) => {
                tracing::info!("All cache cleared");
                true
            }
            Err(e) => {
                tracing::error!("Error recreating cache directories: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path().join("cache"), DEFAULT_MAX_CACHE_BYTES).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_layout() {
        let (_dir, store) = store();
        for kind in ArtifactKind::ALL {
            assert!(store.root().join(kind.dir_name()).is_dir());
        }
    }

    #[test]
    fn test_key_is_stable_and_hex() {
        let a = CacheKey::for_identity("dQw4w9WgXcQ");
        let b = CacheKey::for_identity("dQw4w9WgXcQ");
        let c = CacheKey::for_identity("aircAruvnKk");

        assert_eq!(a, b);
        assert_ne!(a.as_str(), c.as_str());
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_put_get_round_trip() {
        let (_dir, store) = store();
        let key = CacheKey::for_identity("dQw4w9WgXcQ");

        assert!(store.put(&key, ArtifactKind::Transcript, b"hello transcript"));
        assert_eq!(
            store.get(&key, ArtifactKind::Transcript).as_deref(),
            Some(&b"hello transcript"[..])
        );
        assert!(store.contains(&key, ArtifactKind::Transcript));
        assert_eq!(store.get(&key, ArtifactKind::Index), None);
    }

    #[test]
    fn test_delete_removes_every_kind() {
        let (_dir, store) = store();
        let key = CacheKey::for_identity("dQw4w9WgXcQ");
        store.put(&key, ArtifactKind::Transcript, b"t");
        store.put(&key, ArtifactKind::Index, b"i");

        assert!(store.delete(&key));

        assert_eq!(store.get(&key, ArtifactKind::Transcript), None);
        assert_eq!(store.get(&key, ArtifactKind::Index), None);
        assert_eq!(store.stats().file_count, 0);
        // deleting again is not an error
        assert!(store.delete(&key));
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let (_dir, store) = store();
        let key = CacheKey::for_identity("dQw4w9WgXcQ");

        store.put(&key, ArtifactKind::Transcript, b"first");
        store.put(&key, ArtifactKind::Transcript, b"second version");

        assert_eq!(
            store.get(&key, ArtifactKind::Transcript).as_deref(),
            Some(&b"second version"[..])
        );
        assert_eq!(store.list_entries().len(), 1);
        assert_eq!(store.stats().file_count, 2);
    }

    #[test]
    fn test_sidecar_identity_mismatch_is_a_miss() {
        let (_dir, store) = store();
        let key = CacheKey::for_identity("dQw4w9WgXcQ");
        store.put(&key, ArtifactKind::Transcript, b"data");

        let impostor = CacheKey {
            hash: key.as_str().to_string(),
            canonical_id: "someoneelse".to_string(),
        };
        assert_eq!(store.get(&impostor, ArtifactKind::Transcript), None);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let (_dir, store) = store();
        let key = CacheKey::for_identity("dQw4w9WgXcQ");
        store.put(&key, ArtifactKind::Transcript, b"data");

        fs_err::write(store.sidecar_path(key.as_str(), ArtifactKind::Transcript), "{not json").unwrap();
        assert_eq!(store.get(&key, ArtifactKind::Transcript), None);

        store.put(&key, ArtifactKind::Transcript, b"data");
        fs_err::write(store.data_path(key.as_str(), ArtifactKind::Transcript), "truncated!!").unwrap();
        assert_eq!(store.get(&key, ArtifactKind::Transcript), None);
    }

    #[test]
    fn test_stats_and_entries() {
        let (_dir, store) = store();
        store.put(&CacheKey::for_identity("aaaaaaaaaaa"), ArtifactKind::Transcript, &[0u8; 100]);
        store.put(&CacheKey::for_identity("bbbbbbbbbbb"), ArtifactKind::Metadata, &[0u8; 50]);

        let stats = store.stats();
        assert_eq!(stats.file_count, 4);
        assert!(stats.total_bytes > 150);

        let entries = store.list_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.iter().map(|e| e.size_bytes).sum::<u64>(), stats.total_bytes);
        assert!(entries
            .iter()
            .any(|e| e.canonical_id.as_deref() == Some("bbbbbbbbbbb") && e.kind == ArtifactKind::Metadata));
    }

    #[test]
    fn test_fresh_temp_files_survive_orphan_cleanup() {
        let (_dir, store) = store();
        let dir = store.root().join(ArtifactKind::Index.dir_name());
        let in_flight = dir.join(".tmp-in-flight");
        fs_err::write(&in_flight, "partial").unwrap();
        let lonely_sidecar = dir.join("feedfacefeedface.meta.json");
        fs_err::write(&lonely_sidecar, "{}").unwrap();

        let freed = store.remove_orphans(STALE_TEMP_AGE);

        assert_eq!(freed, 2);
        assert!(in_flight.exists());
        assert!(!lonely_sidecar.exists());
        assert_eq!(store.remove_orphans(Duration::ZERO), 7);
        assert!(!in_flight.exists());
    }

    #[test]
    fn test_no_temp_files_left_after_writes() {
        let (_dir, store) = store();
        let key = CacheKey::for_identity("dQw4w9WgXcQ");
        store.put(&key, ArtifactKind::Transcript, b"one");
        store.put(&key, ArtifactKind::Transcript, b"two");

        let leftovers = fs_err::read_dir(store.root().join("transcripts"))
            .unwrap()
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        let (_dir, store) = store();
        let key = CacheKey::for_identity("dQw4w9WgXcQ");
        let data = store.data_path(key.as_str(), ArtifactKind::Transcript);
        fs_err::create_dir(&data).unwrap();
        fs_err::write(data.join("pinned"), "x").unwrap();

        assert!(!store.put(&key, ArtifactKind::Transcript, b"data"));

        let leftovers = fs_err::read_dir(store.root().join("transcripts"))
            .unwrap()
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_clear() {
        let (_dir, store) = store();
        let key = CacheKey::for_identity("dQw4w9WgXcQ");
        store.put(&key, ArtifactKind::Transcript, b"data");

        assert!(store.clear());
        assert_eq!(store.stats().total_bytes, 0);
        assert!(store.put(&key, ArtifactKind::Transcript, b"again"));
    }

    #[test]
    fn test_write_failure_degrades_to_false() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let store = CacheStore::open(&root, DEFAULT_MAX_CACHE_BYTES).unwrap();

        // a plain file where the transcripts directory should be
        fs_err::remove_dir_all(root.join("transcripts")).unwrap();
        fs_err::write(root.join("transcripts"), "blocker").unwrap();

        let key = CacheKey::for_identity("dQw4w9WgXcQ");
        assert!(!store.put(&key, ArtifactKind::Transcript, b"data"));
        assert_eq!(store.get(&key, ArtifactKind::Transcript), None);
    }
}
