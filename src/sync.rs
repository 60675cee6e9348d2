//! Brings the cache in line with the desired entries.
//!
//! Every entry owns the bucket named by its fingerprint, and the manifest
//! guarantees fingerprints are unique, so entries are synchronized in
//! parallel without locking. Each entry ends in one of three ways:
//!
//! - the bucket is missing: the snapshot is fetched into a staging directory
//!   and moved to `<bucket>/<name>` once complete;
//! - the bucket holds a snapshot under another name: it is renamed, since the
//!   content (url and ref) is unchanged;
//! - `<bucket>/<name>` exists: it is reused untouched.
//!
//! Before anything is dispatched, entries with unsafe fields are rejected and
//! entries sharing a fingerprint are cut down to the first one, so no two
//! tasks ever work on the same bucket or staging directory.
//!
//! Failures do not cancel sibling entries. They are collected and reported
//! together once every task has finished.

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
    sync::Arc,
};

use log::info;
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    cache,
    fingerprint::Fingerprint,
    git::{
        fetch::{FetchError, SnapshotFetcher},
        probe::ToolCapabilities,
        ToolRunner,
    },
    model::{DesiredEntry, EntryName},
};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{source}")]
    Fetch {
        name: EntryName,
        #[source]
        source: FetchError,
    },
    #[error("Cache bucket {} for `{name}` holds several snapshots ({}); delete the bucket and run again", .bucket.display(), .snapshots.join(", "))]
    CorruptBucket {
        name: EntryName,
        bucket: PathBuf,
        snapshots: Vec<String>,
    },
    #[error("IO error while synchronizing `{name}`: {source}")]
    IO {
        name: EntryName,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid repository entry `{name}`: {reason}")]
    InvalidEntry { name: EntryName, reason: String },
    #[error("Repositories `{first}` and `{name}` point at the same url and ref; only `{first}` was synchronized")]
    SharedContent { name: EntryName, first: EntryName },
    #[error("Synchronization of `{name}` panicked: {message}")]
    Panicked { name: EntryName, message: String },
}

/// Every per-entry error of a run.
#[derive(Error, Debug)]
pub struct SyncFailure {
    pub errors: Vec<SyncError>,
}

impl Display for SyncFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} repositories failed to synchronize", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n\n{error}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Fetched,
    Renamed { from: String },
    Reused,
}

impl SyncOutcome {
    pub fn fetched(&self) -> bool {
        matches!(self, SyncOutcome::Fetched)
    }
}

/// An entry whose snapshot is in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedEntry {
    pub name: EntryName,
    pub path: PathBuf,
    pub outcome: SyncOutcome,
}

/// Results of one run, in completion order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub synced: Vec<SyncedEntry>,
    pub errors: Vec<SyncError>,
}

impl SyncReport {
    pub fn resolved_paths(&self) -> Vec<PathBuf> {
        self.synced.iter().map(|entry| entry.path.clone()).collect()
    }

    pub fn get(&self, name: &EntryName) -> Option<&SyncedEntry> {
        self.synced.iter().find(|entry| &entry.name == name)
    }

    pub fn into_result(self) -> Result<Vec<SyncedEntry>, SyncFailure> {
        if self.errors.is_empty() {
            Ok(self.synced)
        } else {
            Err(SyncFailure {
                errors: self.errors,
            })
        }
    }
}

struct Context {
    cache_root: PathBuf,
    runner: Arc<dyn ToolRunner>,
    capabilities: ToolCapabilities,
}

pub struct Synchronizer {
    context: Arc<Context>,
    jobs: Option<usize>,
}

impl Synchronizer {
    /// `jobs` bounds how many entries are worked on at once; `None` uses the
    /// available parallelism and `Some(0)` runs every entry at once.
    pub fn new(
        cache_root: impl Into<PathBuf>,
        runner: Arc<dyn ToolRunner>,
        capabilities: ToolCapabilities,
        jobs: Option<usize>,
    ) -> Self {
        Synchronizer {
            context: Arc::new(Context {
                cache_root: cache_root.into(),
                runner,
                capabilities,
            }),
            jobs,
        }
    }

    fn permits(&self, entries: usize) -> usize {
        let permits = match self.jobs {
            Some(0) => entries,
            Some(jobs) => jobs,
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };
        permits.max(1)
    }

    pub async fn run(&self, entries: &[DesiredEntry]) -> SyncReport {
        let mut report = SyncReport::default();
        let entries = dispatchable(entries, &mut report.errors);

        let semaphore = Arc::new(Semaphore::new(self.permits(entries.len())));
        let mut tasks = JoinSet::new();

        for entry in entries {
            let context = self.context.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let name = entry.name.clone();
                tokio::task::spawn_blocking(move || sync_entry(&context, &entry))
                    .await
                    .unwrap_or_else(|error| {
                        Err(SyncError::Panicked {
                            name,
                            message: error.to_string(),
                        })
                    })
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(synced)) => {
                    log_outcome(&synced);
                    report.synced.push(synced);
                }
                Ok(Err(error)) => report.errors.push(error),
                Err(error) => report.errors.push(SyncError::Panicked {
                    name: EntryName::from("<unknown>"),
                    message: error.to_string(),
                }),
            }
        }
        report
    }
}

/// Entries that can run side by side: valid fields and one entry per fingerprint.
///
/// An exact repeat of an accepted entry is dropped quietly; another name for
/// the same url and ref is reported and left out.
fn dispatchable(entries: &[DesiredEntry], errors: &mut Vec<SyncError>) -> Vec<DesiredEntry> {
    let mut owners: HashMap<Fingerprint, &EntryName> = HashMap::new();
    let mut accepted = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Err(reason) = entry.validate() {
            errors.push(SyncError::InvalidEntry {
                name: entry.name.clone(),
                reason,
            });
            continue;
        }
        match owners.entry(entry.fingerprint()) {
            Entry::Occupied(owner) => {
                if *owner.get() != &entry.name {
                    errors.push(SyncError::SharedContent {
                        name: entry.name.clone(),
                        first: (*owner.get()).clone(),
                    });
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(&entry.name);
                accepted.push(entry.clone());
            }
        }
    }
    accepted
}

fn log_outcome(synced: &SyncedEntry) {
    match &synced.outcome {
        SyncOutcome::Fetched => info!("Fetched `{}` into {}", synced.name, synced.path.display()),
        SyncOutcome::Renamed { from } => info!(
            "Renamed cached `{}` to `{}` at {}",
            from,
            synced.name,
            synced.path.display()
        ),
        SyncOutcome::Reused => info!("Reusing `{}` at {}", synced.name, synced.path.display()),
    }
}

fn sync_entry(context: &Context, entry: &DesiredEntry) -> Result<SyncedEntry, SyncError> {
    let io_error = |source| SyncError::IO {
        name: entry.name.clone(),
        source,
    };
    let fingerprint = entry.fingerprint();
    let bucket = cache::bucket_path(&context.cache_root, &fingerprint);
    let snapshot = bucket.join(entry.name.as_str());

    let synced = |outcome| SyncedEntry {
        name: entry.name.clone(),
        path: snapshot.clone(),
        outcome,
    };

    if snapshot.is_dir() {
        return Ok(synced(SyncOutcome::Reused));
    }

    if bucket.is_dir() {
        if let Some(previous) = sole_snapshot(&bucket, entry)? {
            let from = previous
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            std::fs::rename(&previous, &snapshot).map_err(io_error)?;
            return Ok(synced(SyncOutcome::Renamed { from }));
        }
    }

    let staging = cache::staging_path(&context.cache_root, &fingerprint);
    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(io_error)?;
    }
    if let Some(parent) = staging.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }

    info!("Fetching '{}' at ref '{}'", entry.url, entry.reference);
    SnapshotFetcher::new(context.runner.as_ref(), context.capabilities)
        .fetch(&entry.url, &entry.reference, &staging)
        .map_err(|source| SyncError::Fetch {
            name: entry.name.clone(),
            source,
        })?;

    std::fs::create_dir_all(&bucket).map_err(io_error)?;
    std::fs::rename(&staging, &snapshot).map_err(io_error)?;
    Ok(synced(SyncOutcome::Fetched))
}

/// The snapshot a bucket currently holds, if any.
///
/// An empty bucket is left over from an interrupted run and gets refetched.
fn sole_snapshot(bucket: &Path, entry: &DesiredEntry) -> Result<Option<PathBuf>, SyncError> {
    let io_error = |source| SyncError::IO {
        name: entry.name.clone(),
        source,
    };
    let mut snapshots = Vec::new();
    for dir_entry in std::fs::read_dir(bucket).map_err(io_error)? {
        let path = dir_entry.map_err(io_error)?.path();
        if path.is_dir() {
            snapshots.push(path);
        }
    }

    match snapshots.len() {
        0 => Ok(None),
        1 => Ok(snapshots.pop()),
        _ => Err(SyncError::CorruptBucket {
            name: entry.name.clone(),
            bucket: bucket.to_path_buf(),
            snapshots: snapshots
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
        }),
    }
}
