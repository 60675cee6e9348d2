use std::{env, path::PathBuf, sync::Arc};

use anyhow::Context;
use home::home_dir;

use crate::{
    cache::DockyardCache,
    git::{GitCli, ToolRunner},
    Dockyard,
};

#[derive(Default)]
pub struct DockyardBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    manifest_file_name: Option<PathBuf>,
    cache_directory_path: Option<PathBuf>,
    cache_limit: Option<usize>,
    jobs: Option<usize>,
    git_path: Option<PathBuf>,
    tool_runner: Option<Arc<dyn ToolRunner>>,
}

impl DockyardBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the dockyard manifest.
    ///
    /// Defaults to `dockyard.toml`.
    pub fn manifest_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_file_name = Some(path.into());
        self
    }

    /// Location of the snapshot cache.
    ///
    /// Defaults to `$XDG_CACHE_HOME/dockyard`, or `$HOME/.cache/dockyard`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// Prune multiplier. Overrides `cache_limit` from the manifest.
    pub fn cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = Some(limit);
        self
    }

    /// How many repositories are synchronized at once; `0` means all of them.
    ///
    /// Defaults to the available parallelism.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Path of the `git` binary. Defaults to `git` on `PATH`.
    pub fn git_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.git_path = Some(path.into());
        self
    }

    /// Replaces the `git` subprocess runner, `git_path` is ignored when set.
    pub fn tool_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.tool_runner = Some(runner);
        self
    }

    pub fn try_build(self) -> anyhow::Result<Dockyard> {
        let Self {
            root,
            manifest_file_name,
            cache_directory_path,
            cache_limit,
            jobs,
            git_path,
            tool_runner,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let manifest_file_name =
            manifest_file_name.unwrap_or_else(|| PathBuf::from("dockyard.toml"));

        let cache_directory = match cache_directory_path {
            Some(path) => root.join(path),
            None => default_cache_directory()?,
        };
        let cache = DockyardCache::new(cache_directory.clone())
            .with_context(|| format!("Could not open the cache at {}", cache_directory.display()))?;

        let runner: Arc<dyn ToolRunner> = match tool_runner {
            Some(runner) => runner,
            None => Arc::new(git_path.map(GitCli::new).unwrap_or_default()),
        };

        Ok(Dockyard {
            cache,
            root,
            manifest_file_name,
            cache_limit,
            jobs,
            runner,
        })
    }
}

fn default_cache_directory() -> anyhow::Result<PathBuf> {
    if let Some(xdg_cache) = env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg_cache).join("dockyard"));
    }
    let mut cache_directory = home_dir().context(
        "Could not find home dir. Please define $HOME env variable or set DOCKYARD_CACHE_DIR.",
    )?;
    cache_directory.push(".cache/dockyard");
    Ok(cache_directory)
}
