//! Crate-level error taxonomy for registry diagnostics.

use std::path::PathBuf;
use std::sync::Arc;

use crate::descriptor::Descriptor;

/// All errors in defreg carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the descriptor, path, or reason for
/// failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A coalesced resolution was abandoned mid-flight by its leading thread.
    #[error("resolution abandoned: {key}")]
    Abandoned {
        /// Cache key whose population was abandoned.
        key: String,
    },

    /// Two stores declared the same claim pattern. Configuration error,
    /// fatal at registry build time, never raised per-request.
    #[error("ambiguous owner for claim `{claim}`: stores `{first}` and `{second}`")]
    AmbiguousOwner {
        /// The duplicated claim pattern.
        claim: String,
        /// Name of the store registered first.
        first: String,
        /// Name of the store registered second.
        second: String,
    },

    /// Expected registry config file does not exist on disk.
    #[error("config not found: {}", path.display())]
    ConfigNotFound {
        /// Path to the missing config file.
        path: PathBuf,
    },

    /// No store owns the descriptor, or the owning store has no source for
    /// it. May be legitimate for optional references; propagated, not retried.
    #[error("definition not found: `{descriptor}`")]
    DefinitionNotFound {
        /// The descriptor no store could resolve.
        descriptor: Descriptor,
    },

    /// First failure encountered while walking a dependency closure, wrapped
    /// with the requesting root for diagnostics. Partial closures are never
    /// returned.
    #[error("dependency resolution failed for `{root}`: {source}")]
    DependencyResolution {
        /// The root descriptor whose closure build failed.
        root: Descriptor,
        /// The first member failure encountered during traversal.
        #[source]
        source: Box<Error>,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization failed for a manifest or client-state document.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// A qualified-name string does not match the descriptor grammar.
    /// Caller error, not retried.
    #[error("malformed identifier `{input}`: {reason}")]
    MalformedIdentifier {
        /// The string that failed to parse.
        input: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// The definition source could not be parsed into a definition.
    #[error("parse failed: {origin}: {reason}")]
    ParseFailed {
        /// The descriptor or file whose source failed to parse.
        origin: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// A definition declares itself as a dependency. Illegal cycle, surfaced
    /// as an error rather than silently absorbed.
    #[error("definition `{descriptor}` depends on itself")]
    SelfDependency {
        /// The self-referential descriptor.
        descriptor: Descriptor,
    },

    /// A coalesced resolution failed in another thread; the original failure
    /// is shared by every waiter.
    #[error("{0}")]
    Shared(
        /// The original failure, shared across waiters.
        Arc<Error>,
    ),

    /// The root the client declared can no longer be resolved at all.
    /// Surfaced as "client must restart session", never retried transparently.
    #[error("stale client state: root `{root}` is no longer resolvable")]
    StaleClientState {
        /// The unresolvable root descriptor.
        root: Descriptor,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// A filesystem watcher could not be created or attached.
    #[error("watch setup failed: {reason}")]
    WatchSetup {
        /// Description of the watcher failure.
        reason: String,
    },
}

impl Error {
    /// Unwrap a shared failure when this caller is the only holder,
    /// otherwise keep it shared.
    pub fn from_shared(error: Arc<Error>) -> Error {
        return Arc::try_unwrap(error).unwrap_or_else(|arc| return Error::Shared(arc));
    }
}
