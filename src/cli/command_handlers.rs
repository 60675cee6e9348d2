use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context};
use log::{info, warn};

use crate::{
    cache::DockyardCache,
    git::{
        probe::{probe_capabilities, ToolCapabilities},
        ToolRunner,
    },
    model::Manifest,
    prune::{prune, PruneReport, DEFAULT_CACHE_LIMIT},
    sync::{SyncedEntry, Synchronizer},
};

/// What a `sync` run produced.
#[derive(Debug)]
pub struct SyncSummary {
    /// The consumer's path list: configured base paths, then every resolved
    /// snapshot path in the order the snapshots became ready.
    pub paths: Vec<PathBuf>,
    pub synced: Vec<SyncedEntry>,
    /// `None` when pruning was not requested.
    pub pruned: Option<PruneReport>,
}

/// Handler to sync command
/// 1 - Loads and validates the manifest
/// 2 - Probes git once for the fetch strategy
/// 3 - Fetches, renames or reuses every repository concurrently
/// 4 - Prunes unused cache entries, unless synchronization failed
pub fn do_sync(
    cache: &DockyardCache,
    runner: Arc<dyn ToolRunner>,
    root: &Path,
    manifest_file_name: &Path,
    cache_limit: Option<usize>,
    jobs: Option<usize>,
    prune_cache: bool,
) -> anyhow::Result<SyncSummary> {
    let manifest = load_manifest(root, manifest_file_name)?;
    let capabilities = probe_capabilities(runner.as_ref())?;

    cache.clear_staging()?;

    let synchronizer = Synchronizer::new(cache.location(), runner, capabilities, jobs);
    let runtime = tokio::runtime::Builder::new_multi_thread().build()?;
    let synced = runtime
        .block_on(synchronizer.run(&manifest.entries))
        .into_result()?;

    let mut consumer = manifest.consumer.clone();
    for entry in &synced {
        consumer.register(&entry.path);
    }
    info!(
        "Synchronized {} repositories for {} ({} fetched)",
        synced.len(),
        consumer.name,
        synced.iter().filter(|entry| entry.outcome.fetched()).count()
    );

    let pruned = if prune_cache {
        let configured: Vec<PathBuf> = synced.iter().map(|entry| entry.path.clone()).collect();
        let multiplier = resolve_cache_limit(cache_limit, &manifest);
        Some(prune(&configured, cache.location(), multiplier)?)
    } else {
        None
    };

    Ok(SyncSummary {
        paths: consumer.paths,
        synced,
        pruned,
    })
}

/// Handler to prune command
pub fn do_prune(
    cache: &DockyardCache,
    root: &Path,
    manifest_file_name: &Path,
    cache_limit: Option<usize>,
) -> anyhow::Result<PruneReport> {
    let manifest = load_manifest(root, manifest_file_name)?;
    let configured = manifest.expected_paths(cache.location());
    let multiplier = resolve_cache_limit(cache_limit, &manifest);
    let report = prune(&configured, cache.location(), multiplier)?;
    if report.removed.is_empty() {
        info!(
            "{} unused cache entries kept (limit {})",
            report.unused.len(),
            configured.len().saturating_mul(multiplier)
        );
    }
    Ok(report)
}

/// Handler to probe command
pub fn do_probe(runner: &dyn ToolRunner) -> anyhow::Result<ToolCapabilities> {
    let capabilities = probe_capabilities(runner)?;
    info!(
        "git {} found, using the {} fetch strategy",
        capabilities.version,
        capabilities.strategy()
    );
    Ok(capabilities)
}

/// Handler to init command
pub fn do_init(
    root: &Path,
    consumer: Option<String>,
    manifest_file_name: &Path,
) -> anyhow::Result<()> {
    let consumer = consumer.unwrap_or_else(|| DEFAULT_CONSUMER.to_owned());
    let manifest_path = root.join(manifest_file_name);
    if manifest_path.exists() {
        bail!("File already exists: {}", manifest_path.display());
    }
    std::fs::write(&manifest_path, Manifest::skeleton(&consumer)?)?;
    info!("Wrote manifest to {}", manifest_path.display());
    Ok(())
}

pub fn do_clear_cache(cache: &DockyardCache) -> anyhow::Result<()> {
    cache.clear()?;
    Ok(())
}

/// Prints one path per line, to `output` if given.
pub fn write_paths(paths: &[PathBuf], output: Option<&Path>) -> anyhow::Result<()> {
    let mut text = String::new();
    for path in paths {
        text.push_str(&path.to_string_lossy());
        text.push('\n');
    }
    match output {
        Some(output) => {
            std::fs::write(output, text)
                .with_context(|| format!("Could not write {}", output.display()))?;
            info!("Wrote {} paths to {}", paths.len(), output.display());
        }
        None => std::io::stdout().lock().write_all(text.as_bytes())?,
    }
    Ok(())
}

const DEFAULT_CONSUMER: &str = "mkdocstrings";

/// Command line (or environment) first, then the manifest, then the default.
fn resolve_cache_limit(cache_limit: Option<usize>, manifest: &Manifest) -> usize {
    cache_limit
        .or(manifest.cache_limit)
        .unwrap_or(DEFAULT_CACHE_LIMIT)
}

fn load_manifest(root: &Path, manifest_file_name: &Path) -> anyhow::Result<Manifest> {
    let manifest_path = root.join(manifest_file_name);
    let manifest = Manifest::from_file(&manifest_path)
        .with_context(|| format!("Could not load {}", manifest_path.display()))?;
    if manifest.entries.is_empty() {
        warn!("No repositories listed in {}", manifest_path.display());
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn cache_limit_precedence() {
        let mut manifest = Manifest::from_toml_str("[consumer]\nname = \"c\"").unwrap();
        assert_eq!(resolve_cache_limit(None, &manifest), DEFAULT_CACHE_LIMIT);

        manifest.cache_limit = Some(5);
        assert_eq!(resolve_cache_limit(None, &manifest), 5);
        assert_eq!(resolve_cache_limit(Some(0), &manifest), 0);
    }

    #[test]
    fn init_writes_a_loadable_manifest() {
        let root = tempdir().unwrap();
        let file = Path::new("dockyard.toml");
        do_init(root.path(), Some("sphinx".to_owned()), file).unwrap();

        let manifest = Manifest::from_file(&root.path().join(file)).unwrap();
        assert_eq!(manifest.consumer.name, "sphinx");
        assert!(manifest.entries.is_empty());

        let error = do_init(root.path(), None, file).unwrap_err();
        assert!(error.to_string().contains("File already exists"));
    }

    #[test]
    fn write_paths_to_file() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("paths.txt");
        write_paths(
            &[PathBuf::from("."), PathBuf::from("/cache/abc/lib")],
            Some(&output),
        )
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            ".\n/cache/abc/lib\n"
        );
    }
}
