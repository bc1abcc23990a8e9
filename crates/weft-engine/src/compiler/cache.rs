//! Compiled artifact caches
//!
//! The proxy compiler persists every generated source through an
//! [`ArtifactCache`]. Entries are addressed by a key derived from the class
//! name ([`cache_key`]) and carry invalidation tags, so all artifacts of a
//! class (or of the whole weaving run, tag [`AOP_TAG`]) can be flushed at once.
//!
//! Two implementations are provided:
//!
//! - [`MemoryCache`]: in-process map with hit/miss/write statistics
//! - [`FileCache`]: one directory per key under a cache root
//!
//! ```text
//! ~/.weft/cache/proxies/
//! ├── acme_billing_Invoice/
//! │   ├── artifact
//! │   └── metadata.json
//! ├── acme_billing_Invoice_Original/
//! │   ├── artifact
//! │   └── metadata.json
//! └── tmp/
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::config::WeavingConfig;

/// Tag carried by every artifact the weaver writes
pub const AOP_TAG: &str = "AOP";

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error (file operations)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Cache directory creation failed
    #[error("Failed to create cache directory: {0}")]
    CacheInitError(String),

    /// Stored payload does not match its recorded checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Metadata could not be read or written
    #[error("Metadata error: {0}")]
    MetadataError(String),

    /// The key cannot be used as a cache entry name
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),
}

/// Cache key of a class: namespace separators become `_`
///
/// `acme::billing::Invoice` and `Acme\Billing\Invoice` map to
/// `acme_billing_Invoice` and `Acme_Billing_Invoice`. Any other character
/// outside `[A-Za-z0-9_-]` is spelled as `_uXXXX`, so every key is a valid
/// entry name.
pub fn cache_key(class_name: &str) -> String {
    let mut key = String::with_capacity(class_name.len());
    for c in class_name.replace("::", "_").chars() {
        match c {
            '\\' => key.push('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '_' | '-') => key.push(c),
            c => key.push_str(&format!("_u{:04x}", u32::from(c))),
        }
    }
    key
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of stored entries
    pub entries: usize,
    /// Number of reads that found an entry
    pub hits: usize,
    /// Number of reads that found nothing
    pub misses: usize,
    /// Number of entries written
    pub writes: usize,
}

/// Storage for compiled artifacts
pub trait ArtifactCache: Send {
    /// Check if an entry exists
    fn has(&self, key: &str) -> bool;

    /// Read an entry
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write an entry, replacing any previous one
    fn set(&mut self, key: &str, payload: &[u8], tags: &[String]) -> Result<(), CacheError>;

    /// Remove an entry; returns whether it existed
    fn remove(&mut self, key: &str) -> Result<bool, CacheError>;

    /// Remove every entry carrying `tag`; returns the number removed
    fn flush_by_tag(&mut self, tag: &str) -> Result<usize, CacheError>;

    /// Current statistics
    fn stats(&self) -> CacheStats;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: Vec<u8>,
    tags: Vec<String>,
}

/// In-process artifact cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: FxHashMap<String, MemoryEntry>,
    hits: usize,
    misses: usize,
    writes: usize,
}

impl MemoryCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags of an entry
    pub fn tags(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(|e| e.tags.as_slice())
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ArtifactCache for MemoryCache {
    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits += 1;
                Ok(Some(entry.payload.clone()))
            }
            None => {
                self.misses += 1;
                Ok(None)
            }
        }
    }

    fn set(&mut self, key: &str, payload: &[u8], tags: &[String]) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                payload: payload.to_vec(),
                tags: tags.to_vec(),
            },
        );
        self.writes += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn flush_by_tag(&mut self, tag: &str) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.tags.iter().any(|t| t == tag));
        Ok(before - self.entries.len())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            writes: self.writes,
        }
    }
}

/// Metadata stored next to a file cache entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Entry key
    pub key: String,

    /// Invalidation tags
    pub tags: Vec<String>,

    /// SHA-256 checksum of the payload (hex-encoded)
    pub checksum: String,

    /// Payload size in bytes
    pub size: usize,
}

const ARTIFACT_FILE: &str = "artifact";
const METADATA_FILE: &str = "metadata.json";
const TMP_DIR: &str = "tmp";

static TMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Directory-backed artifact cache
///
/// Writes go to `tmp/` first and are moved into place with a rename, so a
/// reader never sees a partially written artifact and concurrent writers of
/// the same entry simply replace each other.
#[derive(Debug)]
pub struct FileCache {
    root: PathBuf,
    hits: usize,
    misses: usize,
    writes: usize,
}

impl FileCache {
    /// Open (and create if needed) a cache rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(root.join(TMP_DIR)).map_err(|e| {
            CacheError::CacheInitError(format!("{}: {}", root.display(), e))
        })?;
        Ok(Self {
            root,
            hits: 0,
            misses: 0,
            writes: 0,
        })
    }

    /// Open the cache configured in `[weaving]`
    pub fn open(config: &WeavingConfig) -> Result<Self, CacheError> {
        let root = config
            .cache_dir()
            .map_err(|e| CacheError::CacheInitError(e.to_string()))?;
        Self::new(root)
    }

    /// Get the cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && key != TMP_DIR
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    /// Load the metadata of an entry
    pub fn metadata(&self, key: &str) -> Result<EntryMetadata, CacheError> {
        let path = self.entry_dir(key)?.join(METADATA_FILE);
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| CacheError::MetadataError(e.to_string()))
    }

    /// Write `bytes` to `path` through a temporary file
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let id = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self
            .root
            .join(TMP_DIR)
            .join(format!("{}-{}.tmp", std::process::id(), id));
        let mut tmp_file = fs::File::create(&tmp_path)?;
        tmp_file.write_all(bytes)?;
        tmp_file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn entry_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name != TMP_DIR && entry.path().join(ARTIFACT_FILE).exists() {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl ArtifactCache for FileCache {
    fn has(&self, key: &str) -> bool {
        self.entry_dir(key)
            .map(|dir| dir.join(ARTIFACT_FILE).exists())
            .unwrap_or(false)
    }

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_dir(key)?.join(ARTIFACT_FILE);
        if !path.exists() {
            self.misses += 1;
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let metadata = self.metadata(key)?;
        let actual = hex::encode(Sha256::digest(&bytes));
        if actual != metadata.checksum {
            return Err(CacheError::ChecksumMismatch {
                expected: metadata.checksum,
                actual,
            });
        }

        self.hits += 1;
        Ok(Some(bytes))
    }

    fn set(&mut self, key: &str, payload: &[u8], tags: &[String]) -> Result<(), CacheError> {
        let dir = self.entry_dir(key)?;
        fs::create_dir_all(&dir)?;

        let metadata = EntryMetadata {
            key: key.to_string(),
            tags: tags.to_vec(),
            checksum: hex::encode(Sha256::digest(payload)),
            size: payload.len(),
        };
        let metadata_json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| CacheError::MetadataError(e.to_string()))?;

        self.write_atomic(&dir.join(METADATA_FILE), &metadata_json)?;
        self.write_atomic(&dir.join(ARTIFACT_FILE), payload)?;
        self.writes += 1;
        debug!(key, bytes = payload.len(), "stored artifact");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, CacheError> {
        let dir = self.entry_dir(key)?;
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        Ok(true)
    }

    fn flush_by_tag(&mut self, tag: &str) -> Result<usize, CacheError> {
        let mut removed = 0;
        for key in self.entry_keys()? {
            let tagged = match self.metadata(&key) {
                Ok(metadata) => metadata.tags.iter().any(|t| t == tag),
                // Unreadable metadata cannot be trusted; drop the entry
                Err(_) => true,
            };
            if tagged && self.remove(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entry_keys().map(|keys| keys.len()).unwrap_or(0),
            hits: self.hits,
            misses: self.misses,
            writes: self.writes,
        }
    }
}
