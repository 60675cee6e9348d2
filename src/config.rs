use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Settings taken from `DOCKYARD_*` environment variables.
pub struct DockyardConfig {
    pub cache_dir: Option<PathBuf>,
    pub cache_limit: Option<usize>,
    pub jobs: Option<usize>,
    pub git_path: Option<PathBuf>,
}

impl DockyardConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None)?;

        Ok(Self {
            cache_dir: raw_config.cache.dir,
            cache_limit: raw_config.cache.limit,
            jobs: raw_config.sync.jobs,
            git_path: raw_config.git.path,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    sync: SyncConfig,
    #[serde(default)]
    git: GitConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
    limit: Option<usize>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct SyncConfig {
    jobs: Option<usize>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct GitConfig {
    path: Option<PathBuf>,
}

impl RawConfig {
    fn load(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("DOCKYARD")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_empty() {
        let env = HashMap::from([]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(config, RawConfig::default())
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([
            ("DOCKYARD_CACHE_DIR".to_owned(), "/cache".to_owned()),
            ("DOCKYARD_CACHE_LIMIT".to_owned(), "5".to_owned()),
            ("DOCKYARD_SYNC_JOBS".to_owned(), "8".to_owned()),
            ("DOCKYARD_GIT_PATH".to_owned(), "/opt/git/bin/git".to_owned()),
        ]);
        let config = RawConfig::load(Some(env)).unwrap();
        assert_eq!(
            config,
            RawConfig {
                cache: CacheConfig {
                    dir: Some("/cache".into()),
                    limit: Some(5),
                },
                sync: SyncConfig { jobs: Some(8) },
                git: GitConfig {
                    path: Some("/opt/git/bin/git".into())
                },
            }
        )
    }

    #[test]
    fn rejects_non_numeric_limit() {
        let env = HashMap::from([("DOCKYARD_CACHE_LIMIT".to_owned(), "lots".to_owned())]);
        RawConfig::load(Some(env)).expect_err("limit must be a number");
    }
}
