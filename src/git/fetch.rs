use std::{
    fmt::{Display, Formatter},
    path::Path,
};

use log::{debug, warn};
use thiserror::Error;

use super::{
    probe::{FetchStrategy, ToolCapabilities},
    Invocation, ToolRunner,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    Clone,
    Init,
    AddRemote,
    Fetch,
    Checkout,
}

impl Display for FetchStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FetchStep::Clone => "clone",
            FetchStep::Init => "init",
            FetchStep::AddRemote => "remote add",
            FetchStep::Fetch => "fetch",
            FetchStep::Checkout => "checkout",
        })
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to fetch git URL '{url}' for ref '{reference}' (git {step} exited with {code:?}). See Git output below:\n{stderr}")]
    Failed {
        step: FetchStep,
        url: String,
        reference: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Could not run git {step} for '{url}': {source}")]
    Spawn {
        step: FetchStep,
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Materialises one repository snapshot with the strategy chosen by the probe.
pub struct SnapshotFetcher<'a> {
    runner: &'a dyn ToolRunner,
    capabilities: ToolCapabilities,
}

impl<'a> SnapshotFetcher<'a> {
    pub fn new(runner: &'a dyn ToolRunner, capabilities: ToolCapabilities) -> Self {
        SnapshotFetcher {
            runner,
            capabilities,
        }
    }

    pub fn strategy(&self) -> FetchStrategy {
        self.capabilities.strategy()
    }

    /// Checks out `url` at `reference` into `destination`, which must not exist yet.
    ///
    /// On failure nothing is left at `destination`, so a later run never
    /// mistakes a half-initialised directory for a complete snapshot.
    pub fn fetch(&self, url: &str, reference: &str, destination: &Path) -> Result<(), FetchError> {
        debug!(
            "Fetching {} at {} into {} ({})",
            url,
            reference,
            destination.display(),
            self.strategy()
        );
        let result = match self.strategy() {
            FetchStrategy::Direct => self.fetch_direct(url, reference, destination),
            FetchStrategy::Legacy => self.fetch_legacy(url, reference, destination),
        };

        if result.is_err() && destination.exists() {
            if let Err(error) = std::fs::remove_dir_all(destination) {
                warn!(
                    "Could not remove partial checkout {}: {}",
                    destination.display(),
                    error
                );
            }
        }
        result
    }

    fn fetch_direct(
        &self,
        url: &str,
        reference: &str,
        destination: &Path,
    ) -> Result<(), FetchError> {
        let clone = Invocation::new(["clone", "--quiet", "--depth=1"])
            .arg(format!("--revision={reference}"))
            .arg("--")
            .arg(url)
            .arg(destination);
        self.run_step(FetchStep::Clone, &clone, url, reference)
    }

    fn fetch_legacy(
        &self,
        url: &str,
        reference: &str,
        destination: &Path,
    ) -> Result<(), FetchError> {
        std::fs::create_dir_all(destination)?;

        let steps = [
            (FetchStep::Init, Invocation::in_dir(destination).args(["init", "--quiet"])),
            (
                FetchStep::AddRemote,
                Invocation::in_dir(destination)
                    .args(["remote", "add", "origin"])
                    .arg(url),
            ),
            (
                FetchStep::Fetch,
                Invocation::in_dir(destination)
                    .args(["fetch", "--quiet", "--depth=1", "origin"])
                    .arg(reference),
            ),
            (
                FetchStep::Checkout,
                Invocation::in_dir(destination)
                    .args(["-c", "advice.detachedHead=false"])
                    .args(["checkout", "--quiet", "FETCH_HEAD"]),
            ),
        ];
        for (step, invocation) in &steps {
            self.run_step(*step, invocation, url, reference)?;
        }
        Ok(())
    }

    fn run_step(
        &self,
        step: FetchStep,
        invocation: &Invocation,
        url: &str,
        reference: &str,
    ) -> Result<(), FetchError> {
        let output = self
            .runner
            .run(invocation)
            .map_err(|source| FetchError::Spawn {
                step,
                url: url.to_owned(),
                source,
            })?;
        if output.success {
            Ok(())
        } else {
            Err(FetchError::Failed {
                step,
                url: url.to_owned(),
                reference: reference.to_owned(),
                code: output.code,
                stderr: output.diagnostics().to_owned(),
            })
        }
    }
}
