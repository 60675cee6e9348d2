use std::fmt::{Display, Formatter};

use log::debug;
use regex_lite::Regex;
use thiserror::Error;

use super::{Invocation, ToolRunner};

/// First git release whose `clone` accepts `--revision=<ref>`.
const DIRECT_CHECKOUT_SINCE: ToolVersion = ToolVersion {
    major: 2,
    minor: 49,
    patch: None,
};

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Could not run git, is it installed and on PATH? {0}")]
    ToolUnavailable(#[source] std::io::Error),
    #[error("`git --version` exited with {code:?}: {stderr}")]
    VersionQueryFailed { code: Option<i32>, stderr: String },
    #[error("Could not find a version number in `git --version` output: {0:?}")]
    VersionUnparseable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl ToolVersion {
    /// Extracts the first `major.minor[.patch]` token from version output such
    /// as `git version 2.39.3 (Apple Git-146)`.
    pub fn parse(output: &str) -> Result<ToolVersion, ProbeError> {
        let re = Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").unwrap();
        let captures = re
            .captures(output)
            .ok_or_else(|| ProbeError::VersionUnparseable(output.trim().to_owned()))?;
        let number = |i: usize| captures.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

        match (number(1), number(2)) {
            (Some(major), Some(minor)) => Ok(ToolVersion {
                major,
                minor,
                patch: number(3),
            }),
            _ => Err(ProbeError::VersionUnparseable(output.trim().to_owned())),
        }
    }

    fn at_least(&self, other: &ToolVersion) -> bool {
        (self.major, self.minor) >= (other.major, other.minor)
    }
}

impl Display for ToolVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

/// How snapshots are materialised for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// `git clone --depth=1 --revision=<ref>`.
    Direct,
    /// init, remote add, shallow fetch, checkout.
    Legacy,
}

impl Display for FetchStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::Direct => f.write_str("direct ref checkout"),
            FetchStrategy::Legacy => f.write_str("legacy init/fetch/checkout"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolCapabilities {
    pub version: ToolVersion,
    pub supports_direct_ref_checkout: bool,
}

impl ToolCapabilities {
    pub fn from_version(version: ToolVersion) -> Self {
        ToolCapabilities {
            version,
            supports_direct_ref_checkout: version.at_least(&DIRECT_CHECKOUT_SINCE),
        }
    }

    pub fn strategy(&self) -> FetchStrategy {
        if self.supports_direct_ref_checkout {
            FetchStrategy::Direct
        } else {
            FetchStrategy::Legacy
        }
    }
}

/// Queries the tool version once; the result is shared by every fetch of the run.
pub fn probe_capabilities(runner: &dyn ToolRunner) -> Result<ToolCapabilities, ProbeError> {
    let output = runner
        .run(&Invocation::new(["--version"]))
        .map_err(ProbeError::ToolUnavailable)?;
    if !output.success {
        return Err(ProbeError::VersionQueryFailed {
            code: output.code,
            stderr: output.diagnostics().to_owned(),
        });
    }

    let version = ToolVersion::parse(&output.stdout)?;
    let capabilities = ToolCapabilities::from_version(version);
    debug!(
        "Detected git {}, using {}",
        capabilities.version,
        capabilities.strategy()
    );
    Ok(capabilities)
}

#[cfg(test)]
mod tests {
    use crate::git::{testing::FakeGit, ToolOutput};

    use super::*;

    use pretty_assertions::assert_eq;

    fn strategy_for(version: &str) -> FetchStrategy {
        probe_capabilities(&FakeGit::new(version)).unwrap().strategy()
    }

    #[test]
    fn parse_versions() {
        assert_eq!(
            ToolVersion::parse("git version 2.49.0\n").unwrap(),
            ToolVersion {
                major: 2,
                minor: 49,
                patch: Some(0)
            }
        );
        assert_eq!(
            ToolVersion::parse("git version 2.39.3 (Apple Git-146)").unwrap(),
            ToolVersion {
                major: 2,
                minor: 39,
                patch: Some(3)
            }
        );
        assert_eq!(
            ToolVersion::parse("git version 3.0").unwrap(),
            ToolVersion {
                major: 3,
                minor: 0,
                patch: None
            }
        );
        assert_eq!(
            ToolVersion::parse("git version 2.45.1.windows.1")
                .unwrap()
                .to_string(),
            "2.45.1"
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        let error = ToolVersion::parse("git version unknown").unwrap_err();
        assert!(matches!(error, ProbeError::VersionUnparseable(s) if s == "git version unknown"));
    }

    #[test]
    fn strategy_threshold() {
        assert_eq!(strategy_for("2.48.1"), FetchStrategy::Legacy);
        assert_eq!(strategy_for("1.99.9"), FetchStrategy::Legacy);
        assert_eq!(strategy_for("2.49.0"), FetchStrategy::Direct);
        assert_eq!(strategy_for("2.50.1"), FetchStrategy::Direct);
        assert_eq!(strategy_for("3.0"), FetchStrategy::Direct);
    }

    struct Unavailable;

    impl ToolRunner for Unavailable {
        fn run(&self, _: &Invocation) -> std::io::Result<ToolOutput> {
            Err(std::io::Error::from(std::io::ErrorKind::NotFound))
        }
    }

    struct Broken;

    impl ToolRunner for Broken {
        fn run(&self, _: &Invocation) -> std::io::Result<ToolOutput> {
            Ok(ToolOutput::failure(129, "unknown option\n"))
        }
    }

    #[test]
    fn probe_failures() {
        assert!(matches!(
            probe_capabilities(&Unavailable),
            Err(ProbeError::ToolUnavailable(_))
        ));
        match probe_capabilities(&Broken) {
            Err(ProbeError::VersionQueryFailed { code, stderr }) => {
                assert_eq!(code, Some(129));
                assert_eq!(stderr, "unknown option");
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(matches!(
            probe_capabilities(&FakeGit::new("nightly")),
            Err(ProbeError::VersionUnparseable(_))
        ));
    }
}
