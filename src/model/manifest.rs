use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{cache, fingerprint::Fingerprint, model::ParseError};

/// Directory-safe label of a repository snapshot.
#[derive(Clone, Hash, Deserialize, Serialize, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub struct EntryName(String);

impl EntryName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntryName {
    fn from(s: String) -> Self {
        EntryName(s)
    }
}

impl From<&str> for EntryName {
    fn from(s: &str) -> Self {
        EntryName(s.to_string())
    }
}

/// A repository the documentation build wants checked out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DesiredEntry {
    pub name: EntryName,
    pub url: String,
    pub reference: String,
}

impl DesiredEntry {
    pub fn new(
        name: impl Into<EntryName>,
        url: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        DesiredEntry {
            name: name.into(),
            url: url.into(),
            reference: reference.into(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.url, &self.reference)
    }

    /// Checks the name is a safe path segment and url and ref are safe git arguments.
    pub fn validate(&self) -> Result<(), String> {
        validate_name(self.name.as_str())?;
        validate_locator("url", &self.url)?;
        validate_locator("ref", &self.reference)
    }

    /// Where this entry's snapshot lives once synchronized.
    pub fn snapshot_path(&self, cache_root: &Path) -> PathBuf {
        cache::snapshot_path(cache_root, &self.fingerprint(), &self.name)
    }
}

/// The downstream tool that receives the resolved paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    pub name: String,
    pub paths: Vec<PathBuf>,
}

impl Consumer {
    /// Appends a resolved snapshot path after the configured base paths.
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub consumer: Consumer,
    pub entries: Vec<DesiredEntry>,
    pub cache_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    consumer: Option<RawConsumer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    repos: Vec<RawEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawConsumer {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    paths: Option<Vec<PathBuf>>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    name: String,
    url: String,
    #[serde(rename = "ref")]
    reference: String,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Manifest, ParseError> {
        debug!("Attempting to read manifest from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Manifest::from_toml_str(&contents)
    }

    pub fn from_toml_str(data: &str) -> Result<Manifest, ParseError> {
        let raw = toml::from_str::<RawManifest>(data)?;

        let consumer = raw.consumer.ok_or(ParseError::MissingConsumer)?;
        let consumer = Consumer {
            name: consumer.name,
            paths: consumer.paths.unwrap_or_else(|| vec![PathBuf::from(".")]),
        };

        let mut entries: Vec<DesiredEntry> = Vec::with_capacity(raw.repos.len());
        let mut by_name: HashMap<EntryName, usize> = HashMap::new();
        let mut by_fingerprint: HashMap<Fingerprint, EntryName> = HashMap::new();
        for raw_entry in raw.repos {
            let entry = validate_entry(raw_entry)?;

            if let Some(&index) = by_name.get(&entry.name) {
                if entries[index] == entry {
                    warn!("Repository `{}` is listed twice, ignoring the duplicate", entry.name);
                    continue;
                }
                return Err(ParseError::DuplicateName(entry.name.to_string()));
            }
            if let Some(first) = by_fingerprint.get(&entry.fingerprint()) {
                return Err(ParseError::DuplicateContent {
                    first: first.to_string(),
                    second: entry.name.to_string(),
                });
            }

            by_name.insert(entry.name.clone(), entries.len());
            by_fingerprint.insert(entry.fingerprint(), entry.name.clone());
            entries.push(entry);
        }

        Ok(Manifest {
            consumer,
            entries,
            cache_limit: raw.cache_limit,
        })
    }

    /// A manifest with a consumer and no repositories yet.
    pub fn skeleton(consumer: &str) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&RawManifest {
            cache_limit: None,
            consumer: Some(RawConsumer {
                name: consumer.to_owned(),
                paths: Some(vec![PathBuf::from(".")]),
            }),
            repos: Vec::new(),
        })
    }

    /// The snapshot path every entry resolves to, in manifest order.
    pub fn expected_paths(&self, cache_root: &Path) -> Vec<PathBuf> {
        self.entries
            .iter()
            .map(|entry| entry.snapshot_path(cache_root))
            .collect()
    }
}

fn validate_entry(raw: RawEntry) -> Result<DesiredEntry, ParseError> {
    let entry = DesiredEntry::new(raw.name, raw.url, raw.reference);
    entry.validate().map_err(|reason| ParseError::InvalidEntry {
        name: entry.name.to_string(),
        reason,
    })?;
    Ok(entry)
}

/// Names become a path segment inside the bucket.
fn validate_name(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("name cannot be empty".to_owned());
    }
    if value.contains('/') || value.contains('\\') {
        return Err("name cannot contain path separators".to_owned());
    }
    if value.starts_with('.') {
        return Err("name cannot start with '.'".to_owned());
    }
    if value.starts_with('-') {
        return Err("name cannot start with '-'".to_owned());
    }
    if value.chars().any(char::is_control) {
        return Err("name cannot contain control characters".to_owned());
    }
    Ok(())
}

/// Urls and refs are passed to git as arguments.
fn validate_locator(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    if value.starts_with('-') {
        return Err(format!("{field} cannot start with '-'"));
    }
    if value.chars().any(char::is_control) {
        return Err(format!("{field} cannot contain control characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use toml::toml;

    use super::*;

    use pretty_assertions::assert_eq;

    fn parse(value: toml::Table) -> Result<Manifest, ParseError> {
        Manifest::from_toml_str(&toml::to_string_pretty(&value).unwrap())
    }

    #[test]
    fn load_manifest() {
        let manifest = parse(toml! {
            cache_limit = 3

            [consumer]
            name = "mkdocstrings"
            paths = [".", "src"]

            [[repos]]
            name = "lib"
            url = "https://example.com/org/lib.git"
            ref = "v1"

            [[repos]]
            name = "tools"
            url = "git@example.com:org/tools.git"
            ref = "0a1b2c3d"
        })
        .unwrap();

        assert_eq!(
            manifest,
            Manifest {
                consumer: Consumer {
                    name: "mkdocstrings".to_owned(),
                    paths: vec![PathBuf::from("."), PathBuf::from("src")],
                },
                entries: vec![
                    DesiredEntry::new("lib", "https://example.com/org/lib.git", "v1"),
                    DesiredEntry::new("tools", "git@example.com:org/tools.git", "0a1b2c3d"),
                ],
                cache_limit: Some(3),
            }
        );
    }

    #[test]
    fn consumer_paths_default_to_current_dir() {
        let manifest = parse(toml! {
            [consumer]
            name = "mkdocstrings"
        })
        .unwrap();
        assert_eq!(manifest.consumer.paths, vec![PathBuf::from(".")]);
        assert!(manifest.entries.is_empty());
        assert_eq!(manifest.cache_limit, None);
    }

    #[test]
    fn missing_consumer() {
        let error = parse(toml! {
            [[repos]]
            name = "lib"
            url = "https://example.com/org/lib.git"
            ref = "v1"
        })
        .unwrap_err();
        assert!(matches!(error, ParseError::MissingConsumer));
    }

    #[test]
    fn rejects_unknown_keys() {
        let error = parse(toml! {
            [consumer]
            name = "mkdocstrings"

            [[repos]]
            name = "lib"
            url = "https://example.com/org/lib.git"
            ref = "v1"
            branch = "main"
        })
        .unwrap_err();
        assert!(matches!(error, ParseError::Toml(_)));
    }

    #[test]
    fn rejects_unsafe_entries() {
        for (name, url, reference) in [
            ("", "https://example.com/a.git", "v1"),
            ("..", "https://example.com/a.git", "v1"),
            ("a/b", "https://example.com/a.git", "v1"),
            (".hidden", "https://example.com/a.git", "v1"),
            ("lib", "--upload-pack=touch /tmp/x", "v1"),
            ("lib", "https://example.com/a.git", " "),
            ("lib", "https://example.com/a.git", "-q"),
            ("lib\n", "https://example.com/a.git", "v1"),
        ] {
            let mut table = toml::Table::new();
            table.insert("consumer".to_owned(), toml::Value::Table(toml! { name = "c" }));
            let mut entry = toml::Table::new();
            entry.insert("name".to_owned(), name.into());
            entry.insert("url".to_owned(), url.into());
            entry.insert("ref".to_owned(), reference.into());
            table.insert(
                "repos".to_owned(),
                toml::Value::Array(vec![toml::Value::Table(entry)]),
            );
            let result = parse(table);
            assert!(
                matches!(result, Err(ParseError::InvalidEntry { .. })),
                "{name:?} {url:?} {reference:?} should be rejected, got {result:?}"
            );
        }
    }

    #[test]
    fn exact_duplicates_are_collapsed() {
        let manifest = parse(toml! {
            [consumer]
            name = "mkdocstrings"

            [[repos]]
            name = "lib"
            url = "https://example.com/org/lib.git"
            ref = "v1"

            [[repos]]
            name = "lib"
            url = "https://example.com/org/lib.git"
            ref = "v1"
        })
        .unwrap();
        assert_eq!(manifest.entries.len(), 1);
    }

    #[test]
    fn conflicting_names_are_rejected() {
        let error = parse(toml! {
            [consumer]
            name = "mkdocstrings"

            [[repos]]
            name = "lib"
            url = "https://example.com/org/lib.git"
            ref = "v1"

            [[repos]]
            name = "lib"
            url = "https://example.com/org/lib.git"
            ref = "v2"
        })
        .unwrap_err();
        assert!(matches!(error, ParseError::DuplicateName(name) if name == "lib"));
    }

    #[test]
    fn shared_content_under_two_names_is_rejected() {
        let error = parse(toml! {
            [consumer]
            name = "mkdocstrings"

            [[repos]]
            name = "lib"
            url = "https://example.com/org/lib.git"
            ref = "v1"

            [[repos]]
            name = "library"
            url = "https://example.com/org/lib.git"
            ref = "v1"
        })
        .unwrap_err();
        match error {
            ParseError::DuplicateContent { first, second } => {
                assert_eq!(first, "lib");
                assert_eq!(second, "library");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn skeleton_round_trips() {
        let text = Manifest::skeleton("mkdocstrings").unwrap();
        let manifest = Manifest::from_toml_str(&text).unwrap();
        assert_eq!(manifest.consumer.name, "mkdocstrings");
        assert_eq!(manifest.consumer.paths, vec![PathBuf::from(".")]);
    }

    #[test]
    fn expected_paths_follow_the_cache_layout() {
        let entry = DesiredEntry::new("lib", "https://example.com/org/lib.git", "v1");
        let manifest = Manifest {
            consumer: Consumer {
                name: "mkdocstrings".to_owned(),
                paths: vec![],
            },
            entries: vec![entry.clone()],
            cache_limit: None,
        };
        assert_eq!(
            manifest.expected_paths(Path::new("/cache")),
            vec![Path::new("/cache")
                .join(entry.fingerprint().as_str())
                .join("lib")]
        );
    }
}
