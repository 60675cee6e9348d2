use std::{path::PathBuf, sync::Arc};

use crate::{
    cache::DockyardCache,
    cli::command_handlers::{do_clear_cache, do_init, do_probe, do_prune, do_sync, SyncSummary},
    git::{probe::ToolCapabilities, ToolRunner},
    prune::PruneReport,
};

mod builder;

pub use builder::DockyardBuilder;

pub struct Dockyard {
    cache: DockyardCache,
    root: PathBuf,
    manifest_file_name: PathBuf,
    cache_limit: Option<usize>,
    jobs: Option<usize>,
    runner: Arc<dyn ToolRunner>,
}

impl Dockyard {
    pub fn builder() -> DockyardBuilder {
        DockyardBuilder::default()
    }

    /// Writes a manifest with no repositories
    pub fn init(&self, consumer: Option<String>) -> anyhow::Result<()> {
        do_init(&self.root, consumer, &self.manifest_file_name)
    }

    /// Brings every repository of the manifest into the cache and returns the consumer's paths
    ///
    /// Runs the synchronization on a runtime of its own and blocks until it
    /// is done.
    ///
    /// # Panics
    ///
    /// When called from within a tokio runtime. Async callers should move the
    /// call onto `tokio::task::spawn_blocking`.
    pub fn sync(&self, prune: bool) -> anyhow::Result<SyncSummary> {
        do_sync(
            &self.cache,
            self.runner.clone(),
            &self.root,
            &self.manifest_file_name,
            self.cache_limit,
            self.jobs,
            prune,
        )
    }

    /// Deletes unused cache entries once there are too many of them
    pub fn prune(&self) -> anyhow::Result<PruneReport> {
        do_prune(
            &self.cache,
            &self.root,
            &self.manifest_file_name,
            self.cache_limit,
        )
    }

    /// Reports the installed git version and the fetch strategy it allows
    pub fn probe(&self) -> anyhow::Result<ToolCapabilities> {
        do_probe(self.runner.as_ref())
    }

    pub fn clear_cache(&self) -> anyhow::Result<()> {
        do_clear_cache(&self.cache)
    }

    pub fn cache_location(&self) -> &std::path::Path {
        self.cache.location()
    }
}
