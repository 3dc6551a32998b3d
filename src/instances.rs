//! Instance expansion tracking for one walk.
//!
//! As resource nodes execute they resolve `count`/`for_each` declarations
//! into concrete instance keys and register the result here. Writes happen
//! concurrently during the walk and are serialized; the full instance set
//! is read back only after the walk quiesces, when move statements are
//! validated against it.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::addrs::{AbsResource, AbsResourceInstance, InstanceKey};
use crate::config::ExpansionDecl;

/// The resolved expansion of one resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expansion {
    /// One keyless instance.
    Single,
    /// `count`: integer keys `0..n`.
    Count(u64),
    /// `for_each`: one instance per string key.
    ForEach(Vec<String>),
    /// An explicit key set, used when instances are recovered from state
    /// rather than declared (destroy planning of undeclared resources).
    Explicit(Vec<InstanceKey>),
}

impl Expansion {
    /// The concrete instance keys this expansion produces.
    #[must_use]
    pub fn instance_keys(&self) -> Vec<InstanceKey> {
        match self {
            Expansion::Single => vec![InstanceKey::NoKey],
            Expansion::Count(n) => (0..*n).map(InstanceKey::Int).collect(),
            Expansion::ForEach(keys) => {
                keys.iter().map(|k| InstanceKey::Str(k.clone())).collect()
            }
            Expansion::Explicit(keys) => keys.clone(),
        }
    }
}

impl From<&ExpansionDecl> for Expansion {
    fn from(decl: &ExpansionDecl) -> Self {
        match decl {
            ExpansionDecl::Single => Expansion::Single,
            ExpansionDecl::Count(n) => Expansion::Count(*n),
            ExpansionDecl::ForEach(keys) => Expansion::ForEach(keys.clone()),
        }
    }
}

/// Registry of the concrete instance keys produced by expansion during
/// one walk. Cloning shares the registry.
#[derive(Clone, Debug, Default)]
pub struct InstanceExpander {
    inner: Arc<RwLock<Vec<(AbsResource, Expansion)>>>,
}

impl InstanceExpander {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the expansion a resource node resolved for its resource.
    /// Last write wins; in a well-formed graph each resource is expanded
    /// exactly once.
    pub fn set_resource_expansion(&self, resource: AbsResource, expansion: Expansion) {
        let mut inner = self.inner.write();
        if let Some(slot) = inner.iter_mut().find(|(r, _)| *r == resource) {
            slot.1 = expansion;
        } else {
            inner.push((resource, expansion));
        }
    }

    /// The instance keys registered for one resource, or empty if the
    /// resource was never expanded during this walk.
    #[must_use]
    pub fn expanded_instance_keys(&self, resource: &AbsResource) -> Vec<InstanceKey> {
        self.inner
            .read()
            .iter()
            .find(|(r, _)| r == resource)
            .map(|(_, e)| e.instance_keys())
            .unwrap_or_default()
    }

    /// Every concrete resource instance known to this walk. Read after the
    /// walk quiesces, for move validation and enumeration.
    #[must_use]
    pub fn all_instances(&self) -> Vec<AbsResourceInstance> {
        let mut out = Vec::new();
        for (resource, expansion) in self.inner.read().iter() {
            for key in expansion.instance_keys() {
                out.push(resource.instance(key));
            }
        }
        out.sort();
        out
    }
}
