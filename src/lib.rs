//! Definition registry with dependency fingerprints.
//!
//! Authors address component definitions by namespaced descriptors; this
//! crate resolves a descriptor's transitive dependency closure, computes a
//! stable content fingerprint over it, caches parsed definitions, evicts
//! them when backing source changes, and reconciles a client's declared
//! state against the server's so only changed definitions are re-sent.

pub mod cache;
pub mod closure;
pub mod config;
pub mod context;
pub mod definition;
pub mod descriptor;
pub mod diagnostics;
pub mod error;
pub mod fingerprint;
pub mod invalidation;
pub mod registry;
pub mod source;
pub mod store;
pub mod watch;

pub use config::RegistryConfig;
pub use context::{ClientState, Context, Manifest};
pub use descriptor::{DefKind, Descriptor};
pub use error::Error;
pub use fingerprint::{Fingerprint, VisibilityFilter};
pub use invalidation::{ChangeKind, SourceChangeEvent};
pub use registry::{Registry, RegistryBuilder};
pub use store::{DefinitionStore, FileStore, StringStore};
