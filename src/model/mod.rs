use thiserror::Error;

pub mod manifest;

pub use manifest::{Consumer, DesiredEntry, EntryName, Manifest};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading manifest: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("No [consumer] table in the manifest. Dockyard needs to know which tool consumes the repository paths, e.g.\n\n[consumer]\nname = \"mkdocstrings\"\npaths = [\".\"]")]
    MissingConsumer,
    #[error("Invalid repository entry `{name}`: {reason}")]
    InvalidEntry { name: String, reason: String },
    #[error("Repository name `{0}` is defined more than once")]
    DuplicateName(String),
    #[error("Repositories `{first}` and `{second}` point at the same url and ref; they would share one cache entry")]
    DuplicateContent { first: String, second: String },
}
