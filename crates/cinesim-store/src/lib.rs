//! cinesim-store: movie table storage
//!
//! This crate provides the storage side of cinesim:
//! - A JSON-lines movie table with a raw-row read path and an upsert write path
//! - An in-memory table for tests and embedding
//! - A store watcher that rebuilds and swaps the catalog on change

pub mod jsonl;
pub mod memory;
pub mod record;
pub mod watcher;

pub use jsonl::{JsonlStore, StoreError, StoreStats, UpsertStats};
pub use memory::MemoryStore;
pub use record::{ImportRow, MovieRecord};
pub use watcher::{StoreEvent, StoreWatcher, WatchError, WatcherConfig, reload, watch_and_reload};
