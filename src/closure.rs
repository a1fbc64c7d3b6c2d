//! Dependency closure construction over declared-dependency edges.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::definition::Definition;
use crate::descriptor::Descriptor;
use crate::error::Error;
use crate::registry::Registry;

/// The transitive dependency set of one root, root included, in
/// first-discovery order. Derived and ephemeral; the ordering is
/// deterministic for a given closure content because it feeds the
/// fingerprint computation.
#[derive(Debug, Clone)]
pub struct Closure {
    /// Resolved members in breadth-first first-discovery order.
    pub members: Vec<Arc<Definition>>,
}

impl Closure {
    /// Iterate member descriptors in closure order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        return self.members.iter().map(|definition| return &definition.descriptor);
    }
}

/// Build the dependency closure of `root`.
///
/// Breadth-first: each dequeued descriptor is resolved through the registry
/// and its unvisited declared dependencies are enqueued. Visited-set
/// membership is by descriptor value equality, so cyclic declarations
/// terminate with each member expanded at most once.
///
/// # Errors
///
/// Returns `Error::DependencyResolution` wrapping the first member
/// failure; a partial closure is never returned as if complete. A definition that
/// declares itself as a dependency fails the build with
/// `Error::SelfDependency` inside the wrapper.
pub fn build_closure(registry: &Registry, root: &Descriptor) -> Result<Closure, Error> {
    let mut members = Vec::new();
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();

    queue.push_back(root.clone());
    visited.insert(root.clone());

    while let Some(descriptor) = queue.pop_front() {
        let definition = registry
            .resolve(&descriptor)
            .map_err(|error| return wrap_member_failure(root, error))?;

        for dependency in &definition.dependencies {
            if *dependency == descriptor {
                let illegal = Error::SelfDependency { descriptor: descriptor.clone() };
                return Err(wrap_member_failure(root, illegal));
            }
            if visited.insert(dependency.clone()) {
                queue.push_back(dependency.clone());
            }
        }

        members.push(definition);
    }

    return Ok(Closure { members });
}

/// Wrap a member failure with the requesting root for diagnostics.
fn wrap_member_failure(root: &Descriptor, error: Error) -> Error {
    return Error::DependencyResolution {
        root: root.clone(),
        source: Box::new(error),
    };
}
