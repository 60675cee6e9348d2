use std::{
    collections::HashSet,
    path::{Component, Path, PathBuf},
};

use log::{debug, info};
use thiserror::Error;

use crate::{cache, fingerprint::Fingerprint};

pub const DEFAULT_CACHE_LIMIT: usize = 2;

#[derive(Error, Debug)]
pub enum PruneError {
    #[error("Refusing to delete {} because it is not inside the cache directory {}. Check the configured cache location.", .target.display(), .root.display())]
    UnsafeTarget { target: PathBuf, root: PathBuf },
    #[error("IO error while pruning {}: {source}", .path.display())]
    IO {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Buckets no configured entry resolves to.
    pub unused: Vec<PathBuf>,
    /// Buckets deleted, empty unless the threshold was exceeded.
    pub removed: Vec<PathBuf>,
}

/// Deletes unused buckets once there are more than `configured_paths.len() * multiplier` of them.
///
/// Below the threshold nothing is touched, so a repository dropped from the
/// configuration for a while does not have to be fetched again when it comes
/// back. A configured path keeps its bucket alive by fingerprint, however the
/// cache root is spelled in it. Every candidate is checked to be strictly
/// inside `cache_root` before anything is deleted.
pub fn prune(
    configured_paths: &[PathBuf],
    cache_root: &Path,
    multiplier: usize,
) -> Result<PruneReport, PruneError> {
    let cache_root = cache_root.canonicalize().map_err(|source| PruneError::IO {
        path: cache_root.to_path_buf(),
        source,
    })?;
    let live: HashSet<Fingerprint> = configured_paths
        .iter()
        .filter_map(|path| path.parent()?.file_name()?.to_str())
        .filter_map(Fingerprint::parse)
        .collect();

    let unused: Vec<PathBuf> = cache::list_buckets(&cache_root)
        .map_err(|source| PruneError::IO {
            path: cache_root.clone(),
            source,
        })?
        .into_iter()
        .filter(|(fingerprint, _)| !live.contains(fingerprint))
        .map(|(_, path)| path)
        .collect();

    let threshold = configured_paths.len().saturating_mul(multiplier);
    if unused.len() <= threshold {
        debug!(
            "{} unused cache entries, pruning starts above {}",
            unused.len(),
            threshold
        );
        return Ok(PruneReport {
            unused,
            removed: Vec::new(),
        });
    }

    info!(
        "Pruning {} unused cache entries from {} (limit {})",
        unused.len(),
        cache_root.display(),
        threshold
    );
    remove_buckets(&cache_root, &unused)?;
    Ok(PruneReport {
        removed: unused.clone(),
        unused,
    })
}

/// Removes `targets` recursively, or nothing at all if any of them escapes `root`.
fn remove_buckets(root: &Path, targets: &[PathBuf]) -> Result<(), PruneError> {
    let root = root.canonicalize().map_err(|source| PruneError::IO {
        path: root.to_path_buf(),
        source,
    })?;
    for target in targets {
        ensure_strict_descendant(&root, target)?;
    }

    for target in targets {
        debug!("Removing {}", target.display());
        std::fs::remove_dir_all(target).map_err(|source| PruneError::IO {
            path: target.clone(),
            source,
        })?;
    }
    Ok(())
}

/// `target` must lie below `root` both as written and after resolving symlinks.
fn ensure_strict_descendant(root: &Path, target: &Path) -> Result<(), PruneError> {
    let unsafe_target = || PruneError::UnsafeTarget {
        target: target.to_path_buf(),
        root: root.to_path_buf(),
    };

    let relative = target.strip_prefix(root).map_err(|_| unsafe_target())?;
    let mut components = relative.components().peekable();
    if components.peek().is_none() || !components.all(|c| matches!(c, Component::Normal(_))) {
        return Err(unsafe_target());
    }

    let resolved = target.canonicalize().map_err(|source| PruneError::IO {
        path: target.to_path_buf(),
        source,
    })?;
    if resolved == root || !resolved.starts_with(root) {
        return Err(unsafe_target());
    }
    Ok(())
}
