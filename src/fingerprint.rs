use std::fmt::{Display, Formatter};

use sha2::{Digest, Sha256};

/// Length of the hex encoded digest.
pub const FINGERPRINT_LEN: usize = 64;

/// Content identity of a snapshot, derived from the remote url and the revision.
///
/// The entry name is deliberately not part of the fingerprint, so renaming an
/// entry keeps it in the same cache bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(url: &str, reference: &str) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        // A NUL never appears in a url or a ref, so it keeps ("ab", "c") and
        // ("a", "bc") apart.
        hasher.update([0u8]);
        hasher.update(reference.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Recognises a cache bucket directory name.
    pub fn parse(s: &str) -> Option<Fingerprint> {
        let valid = s.len() == FINGERPRINT_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| Fingerprint(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<std::path::Path> for Fingerprint {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn stable_across_calls() {
        let first = Fingerprint::new("https://example.com/org/repo.git", "v1");
        let second = Fingerprint::new("https://example.com/org/repo.git", "v1");
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn known_digest() {
        // sha256("https://example/repo.git\0v1"), pinned so caches survive upgrades
        let fingerprint = Fingerprint::new("https://example/repo.git", "v1");
        let mut hasher = Sha256::new();
        hasher.update(b"https://example/repo.git\0v1");
        assert_eq!(fingerprint.as_str(), hex::encode(hasher.finalize()));
    }

    #[test]
    fn distinct_inputs_do_not_collide() {
        let mut seen = HashSet::new();
        let mut count = 0;
        for repo in 0..40 {
            for reference in ["main", "master", "v1", "v1.0.0", "HEAD", "0a1b2c3d"] {
                let url = format!("https://example.com/org/repo-{repo}.git");
                seen.insert(Fingerprint::new(&url, reference));
                count += 1;
            }
        }
        assert_eq!(seen.len(), count);
    }

    #[test]
    fn field_boundary_matters() {
        assert_ne!(
            Fingerprint::new("https://example.com/a", "bc"),
            Fingerprint::new("https://example.com/ab", "c")
        );
    }

    #[test]
    fn parse_accepts_only_digests() {
        let fingerprint = Fingerprint::new("git@example.com:org/repo.git", "main");
        assert_eq!(Fingerprint::parse(fingerprint.as_str()), Some(fingerprint));
        assert_eq!(Fingerprint::parse(".staging"), None);
        assert_eq!(Fingerprint::parse(".lock"), None);
        assert_eq!(Fingerprint::parse(&"A".repeat(FINGERPRINT_LEN)), None);
        assert_eq!(Fingerprint::parse(&"a".repeat(FINGERPRINT_LEN - 1)), None);
    }
}
