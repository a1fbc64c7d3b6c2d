//! Definition stores: where descriptors get their definitions from.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::config::RegistryConfig;
use crate::definition::{Definition, DefinitionParser, ReferenceParser};
use crate::descriptor::{DefKind, Descriptor};
use crate::error::Error;
use crate::fingerprint;
use crate::source;

/// What slice of the descriptor space a store owns. A `None` field matches
/// anything; registration order breaks ties between overlapping patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPattern {
    /// Kinds claimed, or any kind.
    pub kinds: Option<BTreeSet<DefKind>>,
    /// Namespace claimed, or any namespace.
    pub namespace: Option<String>,
    /// Addressing prefix claimed, or any prefix.
    pub prefix: Option<String>,
}

impl ClaimPattern {
    /// A pattern claiming every descriptor.
    pub fn any() -> ClaimPattern {
        return ClaimPattern { kinds: None, namespace: None, prefix: None };
    }

    /// A pattern claiming every kind and prefix within one namespace.
    pub fn namespace(namespace: &str) -> ClaimPattern {
        return ClaimPattern {
            kinds: None,
            namespace: Some(namespace.to_string()),
            prefix: None,
        };
    }

    /// Stable textual form, used for duplicate detection and diagnostics.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        match &self.prefix {
            None => out.push('*'),
            Some(prefix) => out.push_str(prefix),
        }
        out.push_str("://");
        match &self.namespace {
            None => out.push('*'),
            Some(namespace) => out.push_str(namespace),
        }
        match &self.kinds {
            None => {},
            Some(kinds) => {
                out.push('[');
                for (position, kind) in kinds.iter().enumerate() {
                    if position > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{kind}");
                }
                out.push(']');
            },
        }
        return out;
    }

    /// Whether this pattern claims the descriptor.
    pub fn matches(&self, descriptor: &Descriptor) -> bool {
        if self.prefix.as_ref().is_some_and(|prefix| return *prefix != descriptor.prefix) {
            return false;
        }
        if self
            .namespace
            .as_ref()
            .is_some_and(|namespace| return *namespace != descriptor.namespace)
        {
            return false;
        }
        return self.kinds.as_ref().is_none_or(|kinds| return kinds.contains(&descriptor.kind));
    }
}

/// A source of definitions. Stores are stateless with respect to caching
/// (the registry caches) and must be callable from any thread.
pub trait DefinitionStore: Send + Sync {
    /// The descriptor patterns this store owns.
    fn claims(&self) -> &[ClaimPattern];

    /// Store name for configuration diagnostics.
    fn name(&self) -> &str;

    /// Produce the definition for a claimed descriptor.
    ///
    /// # Errors
    ///
    /// Returns `Error::DefinitionNotFound` when the store has no source for
    /// the descriptor, or `Error::ParseFailed` when the source cannot be
    /// parsed.
    fn resolve(&self, descriptor: &Descriptor) -> Result<Definition, Error>;
}

// ── File-backed store ─────────────────────────────────────────────────

/// Markup-backed store over configured namespace roots, using the bundle
/// layout conventions in [`crate::source`].
pub struct FileStore {
    /// Claim patterns, one per configured namespace.
    claims: Vec<ClaimPattern>,
    /// Store name for diagnostics.
    name: String,
    /// Namespace name → directory holding that namespace's bundles.
    namespaces: BTreeMap<String, PathBuf>,
    /// Parser seam to the markup compiler.
    parser: Box<dyn DefinitionParser>,
}

impl FileStore {
    /// Build a store over explicit namespace roots.
    pub fn new(
        name: &str,
        namespaces: BTreeMap<String, PathBuf>,
        parser: Box<dyn DefinitionParser>,
    ) -> FileStore {
        let claims = namespaces.keys().map(|namespace| return ClaimPattern::namespace(namespace)).collect();
        return FileStore {
            claims,
            name: name.to_string(),
            namespaces,
            parser,
        };
    }

    /// Build a store from a loaded registry config, resolving namespace
    /// directories relative to the project root.
    pub fn from_config(config: &RegistryConfig, project_root: &Path) -> FileStore {
        let namespaces = config
            .namespaces
            .iter()
            .map(|(name, dir)| return (name.clone(), project_root.join(dir)))
            .collect();
        return FileStore::new("files", namespaces, Box::new(ReferenceParser::new()));
    }

    /// Enumerate every descriptor currently present under one namespace
    /// root, by walking its bundle directories through the filename
    /// conventions. Unconventional files are skipped.
    pub fn scan_namespace(&self, namespace: &str) -> Vec<Descriptor> {
        let Some(root) = self.namespaces.get(namespace) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for entry in walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| return entry.file_type().is_file())
        {
            // The walked tree is rooted at the namespace dir, whose own name
            // may differ from the namespace; rebuild the descriptor from the
            // bundle-relative layout instead of the absolute path.
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let candidate = Path::new(namespace).join(relative);
            if let Some(descriptor) = source::descriptor_for_path(&candidate) {
                found.push(descriptor);
            }
        }
        found.sort();
        return found;
    }

    /// The on-disk path backing a descriptor, if its namespace is
    /// configured here.
    fn backing_path(&self, descriptor: &Descriptor) -> Option<PathBuf> {
        let root = self.namespaces.get(&descriptor.namespace)?;
        return Some(
            root.join(&descriptor.name).join(source::file_name_for(descriptor)),
        );
    }
}

impl DefinitionStore for FileStore {
    /// One namespace claim per configured namespace.
    fn claims(&self) -> &[ClaimPattern] {
        return &self.claims;
    }

    /// Store name for diagnostics.
    fn name(&self) -> &str {
        return &self.name;
    }

    /// Read, parse, and token-stamp the descriptor's backing file.
    ///
    /// # Errors
    ///
    /// Returns `Error::DefinitionNotFound` for an unconfigured namespace, a
    /// prefix that does not serve the kind, or a missing file; `Error::Io`
    /// for other read failures; parse errors from the parser seam.
    fn resolve(&self, descriptor: &Descriptor) -> Result<Definition, Error> {
        if descriptor.prefix != source::expected_prefix(descriptor.kind) {
            return Err(Error::DefinitionNotFound { descriptor: descriptor.clone() });
        }
        let Some(path) = self.backing_path(descriptor) else {
            return Err(Error::DefinitionNotFound { descriptor: descriptor.clone() });
        };

        let text = match std::fs::read_to_string(&path) {
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::DefinitionNotFound { descriptor: descriptor.clone() });
            },
            Err(error) => return Err(Error::Io(error)),
            Ok(text) => text,
        };

        let parsed = self.parser.parse(descriptor, &text)?;
        return Ok(Definition {
            body: parsed.body,
            dependencies: parsed.dependencies,
            descriptor: descriptor.clone(),
            token: fingerprint::content_token(&text),
        });
    }
}

// ── String-backed store ───────────────────────────────────────────────

/// String-backed store for tests and embedded definitions. Counts parses so
/// coalescing behavior is observable from the outside.
pub struct StringStore {
    /// Claim patterns; defaults to claiming everything.
    claims: Vec<ClaimPattern>,
    /// Store name for diagnostics.
    name: String,
    /// Number of parse invocations performed.
    parses: AtomicU32,
    /// Parser seam, shared with the file store.
    parser: ReferenceParser,
    /// Descriptor → raw source text.
    sources: Mutex<HashMap<Descriptor, String>>,
}

impl StringStore {
    /// An empty store claiming every descriptor.
    pub fn new(name: &str) -> StringStore {
        return StringStore::with_claims(name, vec![ClaimPattern::any()]);
    }

    /// An empty store with explicit claims.
    pub fn with_claims(name: &str, claims: Vec<ClaimPattern>) -> StringStore {
        return StringStore {
            claims,
            name: name.to_string(),
            parses: AtomicU32::new(0),
            parser: ReferenceParser::new(),
            sources: Mutex::new(HashMap::new()),
        };
    }

    /// Insert or replace the source text behind a descriptor.
    pub fn insert(&self, descriptor: Descriptor, text: &str) {
        self.sources.lock().insert(descriptor, text.to_string());
    }

    /// How many times this store has parsed a source.
    pub fn parse_count(&self) -> u32 {
        return self.parses.load(Ordering::SeqCst);
    }
}

impl DefinitionStore for StringStore {
    /// The claims this store was built with.
    fn claims(&self) -> &[ClaimPattern] {
        return &self.claims;
    }

    /// Store name for diagnostics.
    fn name(&self) -> &str {
        return &self.name;
    }

    /// Parse the stored source text for the descriptor.
    ///
    /// # Errors
    ///
    /// Returns `Error::DefinitionNotFound` when no source was inserted for
    /// the descriptor.
    fn resolve(&self, descriptor: &Descriptor) -> Result<Definition, Error> {
        let Some(text) = self.sources.lock().get(descriptor).cloned() else {
            return Err(Error::DefinitionNotFound { descriptor: descriptor.clone() });
        };

        self.parses.fetch_add(1, Ordering::SeqCst);
        let parsed = self.parser.parse(descriptor, &text)?;
        return Ok(Definition {
            body: parsed.body,
            dependencies: parsed.dependencies,
            descriptor: descriptor.clone(),
            token: fingerprint::content_token(&text),
        });
    }
}

/// Shared handles are stores too: callers that need to keep observing a
/// store (its parse count, its inserted sources) after handing it to a
/// registry register an `Arc` clone.
impl DefinitionStore for std::sync::Arc<StringStore> {
    /// Delegates to the shared store.
    fn claims(&self) -> &[ClaimPattern] {
        return (**self).claims();
    }

    /// Delegates to the shared store.
    fn name(&self) -> &str {
        return (**self).name();
    }

    /// Delegates to the shared store.
    ///
    /// # Errors
    ///
    /// Same as the shared store's resolve.
    fn resolve(&self, descriptor: &Descriptor) -> Result<Definition, Error> {
        return (**self).resolve(descriptor);
    }
}
