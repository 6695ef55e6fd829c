//! Entry store that persists cache entries to disk
//!
//! Each `(service, url)` key is one JSON file in an XDG-compliant cache
//! directory (`~/.cache/spotseek/` on Linux). The file name is a hash of the
//! key, so arbitrary URLs never leak into path components.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use directories::ProjectDirs;
use sha2::{Digest, Sha256};

use super::entry::CacheEntry;
use super::store::EntryStore;
use crate::error::StoreError;

/// Disambiguates temporary files written by the same process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores cache entries as JSON files on disk
///
/// Writes always go through a temporary file. Inserts publish it with a hard
/// link, which fails if the key already exists, so the filesystem is the
/// point where racing writers are serialized. Updates rename over the
/// existing file.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where entry files are stored
    cache_dir: PathBuf,
}

impl FileStore {
    /// Creates a new FileStore using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "spotseek")?;
        let cache_dir = project_dirs.cache_dir().join("entries");
        Some(Self { cache_dir })
    }

    /// Creates a new FileStore with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path of the file holding the entry for a key
    fn entry_path(&self, service: &str, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(service.as_bytes());
        hasher.update([0u8]);
        hasher.update(url.as_bytes());
        let hash = hasher.finalize();
        self.cache_dir.join(format!("{}.json", hex::encode(&hash[..16])))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    /// Writes the serialized entry to a fresh temporary file next to `target`
    fn write_temp(&self, target: &Path, entry: &CacheEntry) -> Result<PathBuf, StoreError> {
        self.ensure_dir()?;

        let json = serde_json::to_string_pretty(entry)?;
        let temp = target.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, json)?;
        Ok(temp)
    }
}

impl EntryStore for FileStore {
    fn get(&self, service: &str, url: &str) -> Result<Option<CacheEntry>, StoreError> {
        let path = self.entry_path(service, url);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry = serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;

        Ok(Some(entry.mark_persisted()))
    }

    fn insert(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let path = self.entry_path(&entry.service, &entry.url);
        let temp = self.write_temp(&path, entry)?;

        let linked = fs::hard_link(&temp, &path);
        let _ = fs::remove_file(&temp);

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::Duplicate {
                service: entry.service.clone(),
                url: entry.url.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let path = self.entry_path(&entry.service, &entry.url);
        let temp = self.write_temp(&path, entry)?;

        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }
}
