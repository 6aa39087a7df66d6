//! Store file watching for live catalog reloads.
//!
//! The watcher observes the directory holding the store file and reports
//! debounced changes to the file itself. [`watch_and_reload`] turns those
//! events into catalog rebuilds that are swapped into a [`CatalogHandle`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, channel};
use std::time::Duration;

use cinesim_core::{BuildStats, CatalogBuilder, CatalogError, CatalogHandle, RowSource};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebouncedEvent, Debouncer, new_debouncer};
use tracing::{info, warn};

/// Error type for store watcher operations.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not a file path: {0}")]
    NotAFile(PathBuf),
}

pub type Result<T> = std::result::Result<T, WatchError>;

/// Events emitted by the store watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The store file was written or replaced.
    Changed(PathBuf),
    /// The store file is gone.
    Removed(PathBuf),
}

impl StoreEvent {
    /// Get the path associated with this event.
    pub fn path(&self) -> &Path {
        match self {
            StoreEvent::Changed(p) | StoreEvent::Removed(p) => p,
        }
    }
}

/// Configuration for the store watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for bursts of writes.
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(300),
        }
    }
}

/// Debounced watcher for a single store file.
pub struct StoreWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    rx: Receiver<std::result::Result<Vec<DebouncedEvent>, notify::Error>>,
    file_name: OsString,
    path: PathBuf,
}

impl StoreWatcher {
    /// Watch the store file at `path`.
    pub fn new(path: &Path) -> Result<Self> {
        Self::with_config(path, WatcherConfig::default())
    }

    /// Watch the store file at `path` with custom configuration.
    pub fn with_config(path: &Path, config: WatcherConfig) -> Result<Self> {
        let file_name = path
            .file_name()
            .ok_or_else(|| WatchError::NotAFile(path.to_path_buf()))?
            .to_os_string();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = channel();
        let mut debouncer = new_debouncer(config.debounce_duration, tx)?;

        // Watch the directory: atomic rewrites replace the file's inode
        debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _debouncer: debouncer,
            rx,
            file_name,
            path: path.to_path_buf(),
        })
    }

    /// The watched store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_store_file(&self, path: &Path) -> bool {
        path.file_name() == Some(self.file_name.as_os_str())
    }

    fn to_event(&self, events: Vec<DebouncedEvent>) -> Option<StoreEvent> {
        events
            .into_iter()
            .find(|e| self.is_store_file(&e.path))
            .map(|e| {
                if e.path.exists() {
                    StoreEvent::Changed(e.path)
                } else {
                    StoreEvent::Removed(e.path)
                }
            })
    }

    /// Get the next store event, blocking until one is available.
    ///
    /// Returns `None` if the watcher has been stopped.
    pub fn next_event(&self) -> Option<StoreEvent> {
        loop {
            match self.rx.recv() {
                Ok(Ok(events)) => {
                    if let Some(event) = self.to_event(events) {
                        return Some(event);
                    }
                }
                Ok(Err(e)) => warn!("Watch error on {}: {}", self.path.display(), e),
                Err(_) => return None,
            }
        }
    }

    /// Try to get the next store event without blocking.
    pub fn try_next_event(&self) -> Option<StoreEvent> {
        match self.rx.try_recv() {
            Ok(Ok(events)) => self.to_event(events),
            _ => None,
        }
    }
}

/// Rebuild the catalog from `source` and swap it into `handle`.
///
/// On failure the current snapshot stays in place.
pub fn reload<S: RowSource>(
    builder: &CatalogBuilder,
    source: &mut S,
    handle: &CatalogHandle,
) -> std::result::Result<BuildStats, CatalogError> {
    let (catalog, stats) = builder.build_from(source)?;
    handle.swap(catalog);
    Ok(stats)
}

/// Reload the catalog every time the watched store changes.
///
/// Runs until the watcher stops. `on_reload` sees the outcome of each
/// rebuild attempt.
pub fn watch_and_reload<S, F>(
    watcher: &StoreWatcher,
    builder: &CatalogBuilder,
    source: &mut S,
    handle: &CatalogHandle,
    mut on_reload: F,
) where
    S: RowSource,
    F: FnMut(&std::result::Result<BuildStats, CatalogError>),
{
    while let Some(event) = watcher.next_event() {
        match event {
            StoreEvent::Changed(path) => {
                let outcome = reload(builder, source, handle);
                match &outcome {
                    Ok(stats) => info!(
                        "Reloaded catalog from {}: {} entries",
                        path.display(),
                        stats.accepted
                    ),
                    Err(e) => warn!(
                        "Reload from {} failed, keeping previous catalog: {}",
                        path.display(),
                        e
                    ),
                }
                on_reload(&outcome);
            }
            StoreEvent::Removed(path) => {
                warn!("{} removed, keeping previous catalog", path.display());
            }
        }
    }
}
