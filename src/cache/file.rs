//! On-disk cache backend: one JSON file per fingerprint.
//!
//! Writes go through a uniquely named temp file followed by a rename, so a
//! reader never sees a half-written entry and concurrent writers to the same
//! fingerprint resolve last-writer-wins. Expired and corrupt files are misses
//! and get deleted, but never after a writer has replaced them.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{CacheEntry, Fingerprint, ResultCache};
use crate::errors::CacheError;

#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint))
    }

    fn io_err(path: &Path, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Raw contents of an entry file. `Ok(None)` when it does not exist.
    fn read_raw(&self, path: &Path) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_err(path, e)),
        }
    }

    fn parse_entry(fingerprint: &Fingerprint, content: &str) -> Result<CacheEntry, CacheError> {
        let entry: CacheEntry =
            serde_json::from_str(content).map_err(|source| CacheError::Corrupt {
                fingerprint: fingerprint.to_string(),
                source,
            })?;
        if &entry.fingerprint != fingerprint {
            return Err(CacheError::Corrupt {
                fingerprint: fingerprint.to_string(),
                source: serde::de::Error::custom(format!(
                    "entry is keyed as {}",
                    entry.fingerprint
                )),
            });
        }
        Ok(entry)
    }

    /// Read one entry. `Ok(None)` when the file does not exist.
    fn read_entry(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        match self.read_raw(&self.path_for(fingerprint))? {
            Some(content) => Self::parse_entry(fingerprint, &content).map(Some),
            None => Ok(None),
        }
    }

    /// Remove the entry file only while it still holds `seen`.
    ///
    /// The file is first moved aside, so a concurrent `put` either lands
    /// after the move or is found in the moved file and put back.
    fn delete_if_unchanged(&self, path: &Path, seen: &str) -> Result<bool, CacheError> {
        let retired = self.dir.join(format!(".{}.retired", Uuid::new_v4()));
        match fs::rename(path, &retired) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Self::io_err(path, e)),
        }
        let unchanged = self.read_raw(&retired)?.is_some_and(|current| current == seen);
        if unchanged || path.exists() {
            self.delete(&retired)?;
        } else {
            fs::rename(&retired, path).map_err(|e| Self::io_err(path, e))?;
        }
        Ok(unchanged)
    }

    fn delete(&self, path: &Path) -> Result<bool, CacheError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_err(path, e)),
        }
    }

    /// Fingerprints of every entry file currently on disk.
    fn stored(&self) -> Result<Vec<Fingerprint>, CacheError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_err(&self.dir, e)),
        };
        let mut found = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| Self::io_err(&self.dir, e))?;
            let path = dir_entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(fp) = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(Fingerprint::from_hex)
            {
                found.push(fp);
            }
        }
        Ok(found)
    }
}

impl ResultCache for FileCache {
    fn get(&self, fingerprint: &Fingerprint) -> Option<String> {
        let path = self.path_for(fingerprint);
        let content = match self.read_raw(&path) {
            Ok(Some(content)) => content,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match Self::parse_entry(fingerprint, &content) {
            Ok(entry) if !entry.is_expired() => return Some(entry.output),
            Ok(_) => debug!(fingerprint = %fingerprint.short(), "Cache entry expired"),
            Err(e) => warn!(error = %e, "Discarding corrupt cache entry"),
        }
        if let Err(e) = self.delete_if_unchanged(&path, &content) {
            warn!(error = %e, "Failed to remove stale cache entry");
        }
        None
    }

    fn put(
        &self,
        fingerprint: &Fingerprint,
        output: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_err(&self.dir, e))?;

        let entry = CacheEntry::new(fingerprint.clone(), output, ttl);
        let json = serde_json::to_string_pretty(&entry).map_err(CacheError::Serialize)?;

        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", fingerprint.short(), Uuid::new_v4()));
        fs::write(&tmp, json).map_err(|e| Self::io_err(&tmp, e))?;

        let path = self.path_for(fingerprint);
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(Self::io_err(&path, e));
        }
        Ok(())
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, CacheError> {
        self.delete(&self.path_for(fingerprint))
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for fp in self.stored()? {
            if self.delete(&self.path_for(&fp))? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for fp in self.stored()? {
            let stale = match self.read_entry(&fp) {
                Ok(Some(entry)) => entry.is_expired(),
                Ok(None) => false,
                Err(CacheError::Corrupt { .. }) => true,
                Err(e) => return Err(e),
            };
            if stale && self.delete(&self.path_for(&fp))? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
