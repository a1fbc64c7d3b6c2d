//! File-watch bridge: adapts filesystem notifications into source-change
//! events, feeds them to the registry, and re-resolves the watched root.
//!
//! The watching mechanics stay here at the edge; the engine only ever sees
//! delivered [`SourceChangeEvent`]s.

use std::path::Path;
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};

use crate::config::RegistryConfig;
use crate::descriptor::Descriptor;
use crate::error::Error;
use crate::fingerprint::{Fingerprint, VisibilityFilter};
use crate::invalidation::{ChangeKind, SourceChangeEvent};
use crate::registry::Registry;

/// Debounce delay between filesystem events and re-resolution.
const DEBOUNCE_MS: u64 = 100;

/// Map a notification kind to a change kind; other kinds (access, metadata
/// chatter) are not source changes.
fn change_kind_for(kind: &notify::EventKind) -> Option<ChangeKind> {
    return match kind {
        notify::EventKind::Create(_) => Some(ChangeKind::Created),
        notify::EventKind::Modify(_) => Some(ChangeKind::Changed),
        notify::EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    };
}

/// Create a filesystem watcher that sends one event per changed path.
///
/// # Errors
///
/// Returns `Error::WatchSetup` if the watcher cannot be created.
fn create_watcher(
    tx: crossbeam_channel::Sender<SourceChangeEvent>,
) -> Result<notify::RecommendedWatcher, Error> {
    return notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        let Ok(event) = res else {
            return;
        };
        let Some(kind) = change_kind_for(&event.kind) else {
            return;
        };
        for path in event.paths {
            let _ = tx.send(SourceChangeEvent { kind, path });
        }
    })
    .map_err(|error| {
        return Error::WatchSetup { reason: error.to_string() };
    });
}

/// Drain the channel until it stays quiet for the debounce window, applying
/// every drained event to the registry.
fn drain_and_apply(
    registry: &Registry,
    rx: &crossbeam_channel::Receiver<SourceChangeEvent>,
    first: SourceChangeEvent,
) {
    registry.on_source_changed(&first);
    let debounce = Duration::from_millis(DEBOUNCE_MS);
    while let Ok(event) = rx.recv_timeout(debounce) {
        registry.on_source_changed(&event);
    }
}

/// Resolve and report the current fingerprint, tolerating broken states;
/// a watch session keeps running while the author fixes the source.
fn report_fingerprint(
    registry: &Registry,
    root: &Descriptor,
    filter: &VisibilityFilter,
) -> Option<Fingerprint> {
    return match registry.fingerprint(root, filter) {
        Err(error) => {
            eprintln!("watch: resolution failed: {error}");
            None
        },
        Ok(fingerprint) => {
            eprintln!("watch: {root} -> {fingerprint}");
            Some(fingerprint)
        },
    };
}

/// Entry point for the watch command.
///
/// Resolves once, then watches every configured namespace directory and
/// re-resolves after each (debounced) burst of source changes, reporting
/// fingerprint transitions.
///
/// # Errors
///
/// Returns `Error::WatchSetup` if the watcher cannot be created or a
/// namespace directory cannot be watched.
pub fn run(
    registry: &Registry,
    config: &RegistryConfig,
    project_root: &Path,
    root: &Descriptor,
    filter: &VisibilityFilter,
) -> Result<(), Error> {
    let mut last = report_fingerprint(registry, root, filter);

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = create_watcher(tx)?;

    let mut watched = 0_u32;
    for dir in config.namespaces.values() {
        let path = project_root.join(dir);
        if path.exists() {
            watcher.watch(&path, RecursiveMode::Recursive).map_err(|error| {
                return Error::WatchSetup { reason: error.to_string() };
            })?;
            watched = watched.saturating_add(1);
        }
    }
    eprintln!("watch: monitoring {watched} namespace directories, press Ctrl+C to stop");

    while let Ok(event) = rx.recv() {
        drain_and_apply(registry, &rx, event);
        let next = report_fingerprint(registry, root, filter);
        if next == last {
            eprintln!("watch: fingerprint unchanged");
        }
        last = next;
    }

    return Ok(());
}
