//! Configuration for the change indexer.

mod dependencies;
mod settings;

pub use dependencies::{connect_search_engine, Dependencies};
pub use settings::{IndexerSettings, LogFormat};
