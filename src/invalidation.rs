//! Source-change events and their mapping onto affected descriptors.
//!
//! Events arrive from an external file-watch collaborator; this module only
//! consumes them. The mapping itself never fails: a change the filename
//! conventions cannot attribute yields `None`, which the registry treats as
//! a whole-cache flush signal.

use std::path::PathBuf;

use crate::descriptor::Descriptor;
use crate::source;

/// What happened to the source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The location changed in place.
    Changed,
    /// The location came into existence.
    Created,
    /// The location was removed.
    Deleted,
}

/// One delivered change: a physical location plus what happened to it.
/// Ephemeral; consumed once.
#[derive(Debug, Clone)]
pub struct SourceChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Absolute path of the changed source.
    pub path: PathBuf,
}

/// Map a change event to the descriptor it affects, if the filename
/// conventions can attribute it. Creation, modification, and deletion all
/// map the same way: eviction is the right response to each; what differs
/// is only whether the next resolve succeeds.
pub fn affected_descriptor(event: &SourceChangeEvent) -> Option<Descriptor> {
    return source::descriptor_for_path(&event.path);
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test assertions may panic")]
mod tests {
    use super::*;
    use crate::descriptor::{DefKind, Descriptor};

    /// Build an event for the given path.
    fn event(kind: ChangeKind, path: &str) -> SourceChangeEvent {
        return SourceChangeEvent { kind, path: PathBuf::from(path) };
    }

    #[test]
    fn deletion_maps_like_modification() {
        let descriptor =
            affected_descriptor(&event(ChangeKind::Deleted, "/src/ns/foo/foo.css")).unwrap();
        assert_eq!(descriptor, Descriptor::new("css", "ns", "foo", DefKind::Style));
    }

    #[test]
    fn mapped_suffixes_attribute_to_one_descriptor() {
        let descriptor =
            affected_descriptor(&event(ChangeKind::Changed, "/src/ns/foo/fooController.js"))
                .unwrap();
        assert_eq!(descriptor, Descriptor::new("js", "ns", "foo", DefKind::Controller));
    }

    #[test]
    fn unrecognized_suffix_signals_full_flush() {
        assert_eq!(
            affected_descriptor(&event(ChangeKind::Changed, "/src/ns/foo/fooModel.java")),
            None,
        );
    }
}
