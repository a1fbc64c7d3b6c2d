//! The composite registry: store routing, caching, fingerprints, and
//! reactive invalidation.
//!
//! There is no process-wide registry singleton. A `Registry` is created at
//! startup, handed around explicitly (usually behind an `Arc`), and read by
//! any number of worker threads at once; tests construct as many isolated
//! registries as they like.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::cache::VersionedCache;
use crate::closure::{self, Closure};
use crate::definition::Definition;
use crate::descriptor::Descriptor;
use crate::error::Error;
use crate::fingerprint::{self, Fingerprint, VisibilityFilter};
use crate::invalidation::{self, SourceChangeEvent};
use crate::store::DefinitionStore;

/// Fingerprint cache key: one entry per (root, requesting visibility).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FingerprintKey {
    /// The requesting context's visibility filter.
    pub filter: VisibilityFilter,
    /// The closure root.
    pub root: Descriptor,
}

impl fmt::Display for FingerprintKey {
    /// Write `root-canonical/filter` for cache diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filter = match &self.filter {
            VisibilityFilter::All => "all".to_string(),
            VisibilityFilter::Namespaces(allowed) => {
                allowed.iter().cloned().collect::<Vec<_>>().join(",")
            },
        };
        return write!(f, "{}/{filter}", self.root.canonical());
    }
}

/// Builds a registry from an ordered store list, validating claim
/// configuration before any request is served.
pub struct RegistryBuilder {
    /// Stores in registration (resolution-precedence) order.
    stores: Vec<Box<dyn DefinitionStore>>,
}

impl RegistryBuilder {
    /// An empty builder.
    pub fn new() -> RegistryBuilder {
        return RegistryBuilder { stores: Vec::new() };
    }

    /// Append a store; earlier stores win overlapping claims.
    pub fn with_store(mut self, store: Box<dyn DefinitionStore>) -> RegistryBuilder {
        self.stores.push(store);
        return self;
    }

    /// Validate claims and produce the registry.
    ///
    /// # Errors
    ///
    /// Returns `Error::AmbiguousOwner` when two stores declare the same
    /// claim pattern, a configuration error that must fail startup, never
    /// a per-request resolution.
    pub fn build(self) -> Result<Registry, Error> {
        let mut seen: HashMap<String, String> = HashMap::new();
        for store in &self.stores {
            for claim in store.claims() {
                let description = claim.describe();
                match seen.get(&description) {
                    None => {
                        seen.insert(description, store.name().to_string());
                    },
                    Some(first) => {
                        return Err(Error::AmbiguousOwner {
                            claim: description,
                            first: first.clone(),
                            second: store.name().to_string(),
                        });
                    },
                }
            }
        }

        return Ok(Registry {
            definitions: VersionedCache::new(),
            epoch: AtomicU64::new(0),
            fingerprints: VersionedCache::new(),
            reverse: Mutex::new(HashMap::new()),
            stores: self.stores,
        });
    }
}

impl Default for RegistryBuilder {
    /// Same as [`RegistryBuilder::new`].
    fn default() -> RegistryBuilder {
        return RegistryBuilder::new();
    }
}

/// The shared resolution engine. All methods take `&self` and are safe
/// under arbitrary concurrent use.
pub struct Registry {
    /// Parsed-definition cache, populated single-flight per descriptor.
    definitions: VersionedCache<Descriptor, Definition>,
    /// Invalidation epoch, bumped before any eviction. A fingerprint
    /// computed across an epoch change is rebuilt rather than cached, so
    /// eviction can never be outraced by a concurrent population.
    epoch: AtomicU64,
    /// Fingerprint cache, one entry per (root, visibility).
    fingerprints: VersionedCache<FingerprintKey, Fingerprint>,
    /// Reverse dependency index: closure member → fingerprint entries whose
    /// last-computed closure contained it. Drives targeted eviction; a stale
    /// posting causes at worst a redundant eviction, never a missed one.
    reverse: Mutex<HashMap<Descriptor, HashSet<FingerprintKey>>>,
    /// Stores in resolution-precedence order.
    stores: Vec<Box<dyn DefinitionStore>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("Registry")
            .field("epoch", &self.epoch)
            .field("stores", &self.stores.len())
            .finish_non_exhaustive();
    }
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        return RegistryBuilder::new();
    }

    /// Build the dependency closure of `root`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DependencyResolution` wrapping the first member
    /// failure.
    pub fn closure(&self, root: &Descriptor) -> Result<Closure, Error> {
        return closure::build_closure(self, root);
    }

    /// Current fingerprint for `root` as seen through `filter`.
    ///
    /// Cached per (root, filter); populated single-flight; invalidated
    /// reactively by [`Registry::on_source_changed`], never by TTL.
    ///
    /// # Errors
    ///
    /// Returns the closure build failure when any member cannot be resolved.
    pub fn fingerprint(
        &self,
        root: &Descriptor,
        filter: &VisibilityFilter,
    ) -> Result<Fingerprint, Error> {
        let key = FingerprintKey { filter: filter.clone(), root: root.clone() };
        let computed = self.fingerprints.get_or_compute(&key, || {
            loop {
                let epoch = self.epoch.load(Ordering::SeqCst);
                let closure = self.closure(root)?;
                self.index_closure(&key, &closure);
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    return Ok(fingerprint::compute(&closure, filter));
                }
                // An invalidation raced this computation; its eviction may
                // have missed the not-yet-indexed entry, so rebuild against
                // the current sources instead of settling a stale value.
            }
        });
        return match computed {
            Err(error) => Err(Error::from_shared(error)),
            Ok(value) => Ok((*value).clone()),
        };
    }

    /// React to one source change delivered by the external watcher.
    ///
    /// A change that maps to a descriptor evicts that definition and every
    /// fingerprint the reverse index lists for it. A change outside the
    /// filename conventions cannot be attributed, so both caches are flushed
    /// whole. The conservative fallback is the recovery, silent to the
    /// caller and observable only as slower subsequent resolutions.
    pub fn on_source_changed(&self, event: &SourceChangeEvent) {
        match invalidation::affected_descriptor(event) {
            None => self.flush_all(),
            Some(descriptor) => self.evict(&descriptor),
        }
    }

    /// Resolve one descriptor to its definition, through the definition
    /// cache. Concurrent first resolutions of a cold descriptor coalesce
    /// into a single store parse.
    ///
    /// # Errors
    ///
    /// Returns `Error::DefinitionNotFound` when no store claims the
    /// descriptor or the owning store has no source for it, plus whatever
    /// the owning store's parse reports.
    pub fn resolve(&self, descriptor: &Descriptor) -> Result<Arc<Definition>, Error> {
        let resolved = self.definitions.get_or_compute(descriptor, || {
            let Some(store) = self.owning_store(descriptor) else {
                return Err(Error::DefinitionNotFound { descriptor: descriptor.clone() });
            };
            tracing::debug!(store = store.name(), descriptor = %descriptor, "resolving definition");
            return store.resolve(descriptor);
        });
        return resolved.map_err(Error::from_shared);
    }

    /// Evict one descriptor's definition plus every fingerprint whose
    /// closure could have included it. The epoch bump comes first so any
    /// in-flight fingerprint computation notices the change.
    fn evict(&self, descriptor: &Descriptor) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let evicted_definition = self.definitions.invalidate(descriptor);
        let keys = self.reverse.lock().remove(descriptor).unwrap_or_default();
        let fingerprint_count = keys.len();
        for key in &keys {
            self.fingerprints.invalidate(key);
        }
        tracing::debug!(
            descriptor = %descriptor,
            evicted_definition,
            fingerprint_count,
            "evicted after source change",
        );
    }

    /// Flush both caches and the reverse index.
    fn flush_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.definitions.clear();
        self.fingerprints.clear();
        self.reverse.lock().clear();
        tracing::warn!("source change outside filename conventions; flushed all caches");
    }

    /// Record `key` against every member of its freshly computed closure.
    fn index_closure(&self, key: &FingerprintKey, closure: &Closure) {
        let mut reverse = self.reverse.lock();
        for descriptor in closure.descriptors() {
            reverse.entry(descriptor.clone()).or_default().insert(key.clone());
        }
    }

    /// First registered store whose claims match, if any.
    fn owning_store(&self, descriptor: &Descriptor) -> Option<&dyn DefinitionStore> {
        return self
            .stores
            .iter()
            .find(|store| return store.claims().iter().any(|claim| return claim.matches(descriptor)))
            .map(|store| return &**store);
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test assertions may panic")]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::descriptor::DefKind;
    use crate::invalidation::ChangeKind;
    use crate::store::{ClaimPattern, StringStore};

    /// Shorthand for a markup component descriptor.
    fn component(namespace: &str, name: &str) -> Descriptor {
        return Descriptor::new("markup", namespace, name, DefKind::Component);
    }

    /// Bundle path for a component source within namespace `ns`.
    fn bundle_path(namespace: &str, name: &str) -> PathBuf {
        return PathBuf::from("/src")
            .join(namespace)
            .join(name)
            .join(format!("{name}.cmp"));
    }

    #[test]
    fn concurrent_cold_resolutions_parse_once() {
        let store = Arc::new(StringStore::new("strings"));
        let descriptor = component("ui", "panel");
        store.insert(descriptor.clone(), "<panel/>");
        let registry = RegistryBuilder::new()
            .with_store(Box::new(Arc::clone(&store)))
            .build()
            .unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let definition = registry.resolve(&descriptor).unwrap();
                    assert_eq!(definition.descriptor, descriptor);
                });
            }
        });

        let resolved = registry.resolve(&descriptor).unwrap();
        assert_eq!(resolved.body, "<panel/>");
        // One parse despite eight concurrent cold callers plus the re-read.
        assert_eq!(store.parse_count(), 1);
    }

    #[test]
    fn duplicate_claims_fail_the_build() {
        let err = RegistryBuilder::new()
            .with_store(Box::new(StringStore::new("first")))
            .with_store(Box::new(StringStore::new("second")))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousOwner { .. }));
    }

    #[test]
    fn first_matching_store_wins() {
        let ui = StringStore::with_claims("ui", vec![ClaimPattern::namespace("ui")]);
        let fallback =
            StringStore::with_claims("fallback", vec![ClaimPattern::any()]);
        let descriptor = component("ui", "panel");
        ui.insert(descriptor.clone(), "<from-ui/>");
        fallback.insert(descriptor.clone(), "<from-fallback/>");

        let registry = RegistryBuilder::new()
            .with_store(Box::new(ui))
            .with_store(Box::new(fallback))
            .build()
            .unwrap();

        assert_eq!(registry.resolve(&descriptor).unwrap().body, "<from-ui/>");
    }

    #[test]
    fn mapped_change_evicts_definition_and_fingerprint() {
        let store = Arc::new(StringStore::new("strings"));
        let root = component("ui", "app");
        let header = component("ui", "header");
        store.insert(root.clone(), "<app>markup://ui:header</app>");
        store.insert(header.clone(), "<header v1/>");

        let registry = RegistryBuilder::new()
            .with_store(Box::new(Arc::clone(&store)))
            .build()
            .unwrap();
        let before = registry.fingerprint(&root, &VisibilityFilter::All).unwrap();

        // Edit the header source, then deliver the matching change event.
        store.insert(header.clone(), "<header v2/>");
        registry.on_source_changed(&SourceChangeEvent {
            kind: ChangeKind::Changed,
            path: bundle_path("ui", "header"),
        });

        // The stale fingerprint entry is gone; recomputation re-parses the
        // evicted header and produces a different digest.
        assert!(registry.fingerprints.is_empty());
        let after = registry.fingerprint(&root, &VisibilityFilter::All).unwrap();
        assert_ne!(before, after);
        assert_eq!(
            registry.resolve(&header).unwrap().body,
            "<header v2/>",
            "the next resolve reflects updated content",
        );
    }

    #[test]
    fn change_outside_a_closure_leaves_its_fingerprint_alone() {
        let store = Arc::new(StringStore::new("strings"));
        let root = component("ui", "app");
        let side = component("ui", "side");
        store.insert(root.clone(), "<app/>");
        store.insert(side.clone(), "<side/>");

        let registry = RegistryBuilder::new()
            .with_store(Box::new(Arc::clone(&store)))
            .build()
            .unwrap();
        let before = registry.fingerprint(&root, &VisibilityFilter::All).unwrap();

        store.insert(side.clone(), "<side v2/>");
        registry.on_source_changed(&SourceChangeEvent {
            kind: ChangeKind::Changed,
            path: bundle_path("ui", "side"),
        });

        // The app's cached fingerprint survives; side is not in its closure.
        assert!(!registry.fingerprints.is_empty());
        let after = registry.fingerprint(&root, &VisibilityFilter::All).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn unmapped_change_flushes_everything() {
        let store = StringStore::new("strings");
        let root = component("ui", "app");
        store.insert(root.clone(), "<app/>");
        let registry = RegistryBuilder::new().with_store(Box::new(store)).build().unwrap();

        registry.fingerprint(&root, &VisibilityFilter::All).unwrap();
        assert!(!registry.fingerprints.is_empty());

        registry.on_source_changed(&SourceChangeEvent {
            kind: ChangeKind::Changed,
            path: PathBuf::from("/src/ui/app/appModel.java"),
        });
        assert!(registry.definitions.is_empty());
        assert!(registry.fingerprints.is_empty());
        assert!(registry.reverse.lock().is_empty());
    }

    #[test]
    fn unowned_descriptor_is_not_found() {
        let only_ui =
            StringStore::with_claims("ui", vec![ClaimPattern::namespace("ui")]);
        let registry =
            RegistryBuilder::new().with_store(Box::new(only_ui)).build().unwrap();

        let err = registry.resolve(&component("docs", "page")).unwrap_err();
        assert!(matches!(err, Error::DefinitionNotFound { .. }));
    }
}
