use std::path::PathBuf;

use clap::Parser;

/// Content-addressed cache of git repository snapshots for documentation builds.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Location of the dockyard manifest, relative to the root.
    #[clap(short, long, default_value = "dockyard.toml")]
    pub manifest: PathBuf,
    /// Project root directory [default: current directory]
    #[clap(long)]
    pub root: Option<PathBuf>,
    /// Location of the snapshot cache [default: $XDG_CACHE_HOME/dockyard or $HOME/.cache/dockyard]
    #[clap(short, long)]
    pub cache_directory: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Fetches, renames or reuses every repository of the manifest and prints the consumer's paths
    Sync {
        /// Leave unused cache entries in place
        #[clap(long)]
        no_prune: bool,
        /// Prune once unused entries exceed this many times the configured repositories
        #[clap(long)]
        cache_limit: Option<usize>,
        /// Repositories synchronized at once, 0 for all of them [default: available parallelism]
        #[clap(short, long)]
        jobs: Option<usize>,
        /// Write the paths to this file instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Deletes unused cache entries once there are too many of them
    Prune {
        /// Prune once unused entries exceed this many times the configured repositories
        #[clap(long)]
        cache_limit: Option<usize>,
    },
    /// Reports the installed git version and the fetch strategy it allows
    Probe,
    /// Creates a manifest with no repositories
    Init {
        /// Name of the tool consuming the paths [default: mkdocstrings]
        #[clap(long)]
        consumer: Option<String>,
    },
    /// Removes every cached snapshot
    ClearCache,
}
