use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::{flock::FileLock, fingerprint::Fingerprint, model::EntryName};

const LOCK_FILE: &str = ".lock";
const STAGING_DIR: &str = ".staging";

/// The cache root: `<root>/<fingerprint>/<name>/...`.
///
/// Holding a `DockyardCache` holds an exclusive lock on the root, so two
/// processes never synchronize or prune the same cache at once.
pub struct DockyardCache {
    location: PathBuf,
    _lock: FileLock,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired")]
    Lock(#[from] crate::flock::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl DockyardCache {
    pub fn new(location: PathBuf) -> Result<DockyardCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.display().to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&location)?;
        }
        let location = location.canonicalize()?;

        let lock = Self::acquire_lock(&location)?;

        Ok(DockyardCache {
            location,
            _lock: lock,
        })
    }

    /// Canonical path of the cache root.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Removes fetches left half-done by an interrupted run.
    ///
    /// Must only be called while no synchronization is in flight.
    pub fn clear_staging(&self) -> Result<(), CacheError> {
        let staging = self.location.join(STAGING_DIR);
        if staging.exists() {
            debug!("Removing leftover staging area {}", staging.display());
            std::fs::remove_dir_all(&staging)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        info!("Clearing dockyard cache {}.", self.location.display());
        for entry in std::fs::read_dir(&self.location)? {
            let entry = entry?;
            if entry.file_name() == LOCK_FILE {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn acquire_lock(location: &Path) -> Result<FileLock, CacheError> {
        let location = location.join(LOCK_FILE);
        debug!(
            "Acquiring a lock on the cache location: {}",
            location.display()
        );
        let lock = FileLock::new(&location)?;
        debug!("Acquired a lock on the cache location");
        Ok(lock)
    }
}

pub fn bucket_path(root: &Path, fingerprint: &Fingerprint) -> PathBuf {
    root.join(fingerprint)
}

pub fn snapshot_path(root: &Path, fingerprint: &Fingerprint, name: &EntryName) -> PathBuf {
    bucket_path(root, fingerprint).join(name.as_str())
}

/// Where a fetch for `fingerprint` is assembled before it is moved into its bucket.
pub fn staging_path(root: &Path, fingerprint: &Fingerprint) -> PathBuf {
    root.join(STAGING_DIR).join(fingerprint)
}

/// Bucket directories directly under `root`, keyed by their fingerprint.
pub fn list_buckets(root: &Path) -> std::io::Result<Vec<(Fingerprint, PathBuf)>> {
    let mut buckets = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let Some(fingerprint) = entry.file_name().to_str().and_then(Fingerprint::parse) else {
            continue;
        };
        if path.is_dir() {
            buckets.push((fingerprint, path));
        }
    }
    buckets.sort();
    Ok(buckets)
}
