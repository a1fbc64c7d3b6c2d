//! Content tokens and closure fingerprints (UIDs).

use std::collections::BTreeSet;
use std::fmt;

use sha2::{Digest as _, Sha256};

use crate::closure::Closure;
use crate::descriptor::Descriptor;

/// A content/version token — 64 hex chars, always lowercase. Newtype
/// prevents mixing with arbitrary strings. Pure function of source bytes,
/// so tokens are stable across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContentToken(
    /// The hex-encoded SHA-256 digest string.
    pub String,
);

impl fmt::Display for ContentToken {
    /// Write the hex digest.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

/// A closure fingerprint — the UID a client and server compare to agree on
/// what has already been transmitted. Deterministic digest of the ordered
/// closure's identities and content tokens.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fingerprint(
    /// The hex-encoded SHA-256 digest string.
    pub String,
);

impl fmt::Display for Fingerprint {
    /// Write the hex digest.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

/// Which namespaces a requesting context may see. External clients get a
/// namespace allow-list; internal callers see everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VisibilityFilter {
    /// No filtering; every closure member is visible.
    All,
    /// Only members of the named namespaces are visible.
    Namespaces(BTreeSet<String>),
}

impl VisibilityFilter {
    /// Whether a descriptor's namespace passes this filter.
    pub fn is_visible(&self, descriptor: &Descriptor) -> bool {
        return match self {
            VisibilityFilter::All => true,
            VisibilityFilter::Namespaces(allowed) => allowed.contains(&descriptor.namespace),
        };
    }
}

/// Compute the content token for one definition source.
pub fn content_token(source: &str) -> ContentToken {
    let digest = Sha256::digest(source.as_bytes());
    return ContentToken(format!("{digest:x}"));
}

/// Compute the fingerprint of a closure under a visibility filter.
///
/// Folds, in closure order, each visible member's canonical descriptor
/// string and its content token into one digest. Referentially transparent:
/// identical closures with identical tokens always yield the same
/// fingerprint; any member token change changes it.
pub fn compute(closure: &Closure, filter: &VisibilityFilter) -> Fingerprint {
    let mut hasher = Sha256::new();

    for definition in &closure.members {
        if !filter.is_visible(&definition.descriptor) {
            continue;
        }
        hasher.update(definition.descriptor.canonical().as_bytes());
        hasher.update(b"=");
        hasher.update(definition.token.0.as_bytes());
        hasher.update(b";");
    }

    let digest = hasher.finalize();
    return Fingerprint(format!("{digest:x}"));
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test assertions may panic")]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::definition::Definition;
    use crate::descriptor::DefKind;

    /// Build a one-off member with the given identity and source content.
    fn member(namespace: &str, name: &str, source: &str) -> Arc<Definition> {
        let descriptor = Descriptor::new("markup", namespace, name, DefKind::Component);
        return Arc::new(Definition {
            body: source.to_string(),
            dependencies: Vec::new(),
            descriptor,
            token: content_token(source),
        });
    }

    #[test]
    fn deterministic_across_calls() {
        let closure = Closure {
            members: vec![member("ui", "app", "<app/>"), member("ui", "header", "<header/>")],
        };
        let first = compute(&closure, &VisibilityFilter::All);
        let second = compute(&closure, &VisibilityFilter::All);
        assert_eq!(first, second);
    }

    #[test]
    fn filtered_namespace_is_excluded_from_digest() {
        let visible = Closure { members: vec![member("ui", "app", "<app/>")] };
        let mixed = Closure {
            members: vec![member("ui", "app", "<app/>"), member("internal", "impl", "<x/>")],
        };
        let filter =
            VisibilityFilter::Namespaces(BTreeSet::from_iter(vec!["ui".to_string()]));
        assert_eq!(compute(&mixed, &filter), compute(&visible, &filter));
        assert_ne!(compute(&mixed, &VisibilityFilter::All), compute(&visible, &filter));
    }

    #[test]
    fn member_content_change_changes_fingerprint() {
        let before = Closure {
            members: vec![member("ui", "app", "<app/>"), member("ui", "header", "<header/>")],
        };
        let after = Closure {
            members: vec![member("ui", "app", "<app/>"), member("ui", "header", "<header v2/>")],
        };
        assert_ne!(
            compute(&before, &VisibilityFilter::All),
            compute(&after, &VisibilityFilter::All),
        );
    }

    #[test]
    fn token_is_stable_for_equal_content() {
        assert_eq!(content_token("body"), content_token("body"));
        assert_ne!(content_token("body"), content_token("body2"));
    }
}
