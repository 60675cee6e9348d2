use clap::Parser;

use dockyard::{
    cli::{
        args::{CliArgs, Command},
        command_handlers::write_paths,
    },
    config::DockyardConfig,
    Dockyard,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli_args: CliArgs = CliArgs::parse();
    let config = DockyardConfig::load()?;

    let mut builder = Dockyard::builder().manifest_file_name(cli_args.manifest);
    if let Some(root) = cli_args.root {
        builder = builder.root(root);
    }
    if let Some(cache_directory) = cli_args.cache_directory.or(config.cache_dir) {
        builder = builder.cache_directory(cache_directory);
    }
    if let Some(git_path) = config.git_path {
        builder = builder.git_path(git_path);
    }

    match cli_args.cmd {
        Command::Sync {
            no_prune,
            cache_limit,
            jobs,
            output,
        } => {
            if let Some(cache_limit) = cache_limit.or(config.cache_limit) {
                builder = builder.cache_limit(cache_limit);
            }
            if let Some(jobs) = jobs.or(config.jobs) {
                builder = builder.jobs(jobs);
            }
            let summary = builder.try_build()?.sync(!no_prune)?;
            write_paths(&summary.paths, output.as_deref())
        }
        Command::Prune { cache_limit } => {
            if let Some(cache_limit) = cache_limit.or(config.cache_limit) {
                builder = builder.cache_limit(cache_limit);
            }
            let report = builder.try_build()?.prune()?;
            log::debug!(
                "{} unused, {} removed",
                report.unused.len(),
                report.removed.len()
            );
            Ok(())
        }
        Command::Probe => {
            builder.try_build()?.probe()?;
            Ok(())
        }
        Command::Init { consumer } => builder.try_build()?.init(consumer),
        Command::ClearCache => builder.try_build()?.clear_cache(),
    }
}
