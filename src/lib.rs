pub mod cache;
pub mod cli;
pub mod config;
pub mod fingerprint;
pub mod git;
pub mod model;
pub mod prune;
pub mod sync;

mod api;
mod flock;

pub use api::{Dockyard, DockyardBuilder};
pub use cli::command_handlers::SyncSummary;
