//! State snapshots: the engine's record of previously observed resource
//! instances.
//!
//! A [`State`] is a plain snapshot keyed by absolute resource-instance
//! address. During a walk it is never touched directly; every view is
//! wrapped in a [`SyncState`](sync::SyncState) so concurrently executing
//! graph nodes cannot observe a torn write. Three logical views exist
//! side by side during planning:
//!
//! - *previous-run state*: as it was before the operation began
//! - *refresh state*: updated from real infrastructure, becomes the
//!   plan's prior state
//! - *working state*: as it would look after applying, including
//!   placeholders for resources pending creation
//!
//! Each view is an independent deep copy; no wrapper is ever aliased
//! across two views.

pub mod sync;

pub use sync::SyncState;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::addrs::{AbsResource, AbsResourceInstance};

/// Lifecycle status of a stored resource instance object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectStatus {
    /// The object reflects a real remote object.
    Ready,
    /// A placeholder for an object that planning decided to create. These
    /// exist only so that node execution can reason about pending creates
    /// mid-walk; they are stripped before a plan is returned.
    Planned,
}

/// Marks whether a change targets a deposed object: one replaced during a
/// create-before-destroy but not yet destroyed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeposedKey {
    #[default]
    NotDeposed,
    Key(String),
}

impl DeposedKey {
    #[must_use]
    pub fn is_deposed(&self) -> bool {
        !matches!(self, DeposedKey::NotDeposed)
    }
}

impl fmt::Display for DeposedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeposedKey::NotDeposed => write!(f, "current"),
            DeposedKey::Key(k) => write!(f, "deposed object {k}"),
        }
    }
}

/// One stored resource instance object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceInstanceObject {
    pub status: ObjectStatus,
    pub value: Value,
}

impl ResourceInstanceObject {
    pub fn ready(value: Value) -> Self {
        Self {
            status: ObjectStatus::Ready,
            value,
        }
    }

    /// A placeholder for an object pending creation.
    pub fn planned(value: Value) -> Self {
        Self {
            status: ObjectStatus::Planned,
            value,
        }
    }
}

/// A snapshot of previously observed resource instances.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    resources: FxHashMap<AbsResourceInstance, ResourceInstanceObject>,
}

impl State {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[must_use]
    pub fn resource_instance(&self, addr: &AbsResourceInstance) -> Option<&ResourceInstanceObject> {
        self.resources.get(addr)
    }

    pub fn set_resource_instance(
        &mut self,
        addr: AbsResourceInstance,
        object: ResourceInstanceObject,
    ) {
        self.resources.insert(addr, object);
    }

    pub fn remove_resource_instance(
        &mut self,
        addr: &AbsResourceInstance,
    ) -> Option<ResourceInstanceObject> {
        self.resources.remove(addr)
    }

    /// All stored instances, in unspecified order.
    pub fn all_resource_instances(
        &self,
    ) -> impl Iterator<Item = (&AbsResourceInstance, &ResourceInstanceObject)> {
        self.resources.iter()
    }

    /// The distinct resources with at least one stored instance.
    #[must_use]
    pub fn all_resources(&self) -> Vec<AbsResource> {
        let mut out: Vec<AbsResource> = self
            .resources
            .keys()
            .map(|inst| inst.resource.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// An independent deep copy. Each state view used by a plan walk is
    /// produced this way so the views can diverge without aliasing.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Strip every [`ObjectStatus::Planned`] placeholder. Run on the prior
    /// state of a finished plan walk so placeholders never leak into the
    /// persisted result.
    pub fn remove_planned_resource_instance_objects(&mut self) {
        self.resources
            .retain(|_, object| object.status != ObjectStatus::Planned);
    }

    /// Rewrite every stored instance of `from` to the corresponding
    /// instance address under `to`, returning the rewritten instances as
    /// `(from, to)` pairs.
    pub fn move_resource(
        &mut self,
        from: &AbsResource,
        to: &AbsResource,
    ) -> Vec<(AbsResourceInstance, AbsResourceInstance)> {
        let moved_keys: Vec<_> = self
            .resources
            .keys()
            .filter(|inst| inst.resource == *from)
            .map(|inst| inst.key.clone())
            .collect();

        let mut moved = Vec::with_capacity(moved_keys.len());
        for key in moved_keys {
            let from_addr = from.instance(key.clone());
            if let Some(object) = self.resources.remove(&from_addr) {
                let to_addr = to.instance(key);
                self.resources.insert(to_addr.clone(), object);
                moved.push((from_addr, to_addr));
            }
        }
        moved
    }

    /// Wrap this state for serialized access from concurrent graph nodes.
    #[must_use]
    pub fn sync_wrapper(self) -> SyncState {
        SyncState::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{InstanceKey, ModuleInstance};
    use serde_json::json;

    fn inst(name: &str, key: InstanceKey) -> AbsResourceInstance {
        AbsResource::new(ModuleInstance::root(), "disk", name).instance(key)
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut state = State::new();
        state.set_resource_instance(
            inst("a", InstanceKey::NoKey),
            ResourceInstanceObject::ready(json!({"size": 10})),
        );

        let copy = state.deep_copy();
        state.remove_resource_instance(&inst("a", InstanceKey::NoKey));
        assert!(state.is_empty());
        assert!(copy.resource_instance(&inst("a", InstanceKey::NoKey)).is_some());
    }

    #[test]
    fn planned_placeholders_are_stripped() {
        let mut state = State::new();
        state.set_resource_instance(
            inst("a", InstanceKey::NoKey),
            ResourceInstanceObject::ready(json!(1)),
        );
        state.set_resource_instance(
            inst("b", InstanceKey::NoKey),
            ResourceInstanceObject::planned(json!(2)),
        );

        state.remove_planned_resource_instance_objects();
        assert!(state.resource_instance(&inst("a", InstanceKey::NoKey)).is_some());
        assert!(state.resource_instance(&inst("b", InstanceKey::NoKey)).is_none());
    }

    #[test]
    fn move_resource_rewrites_every_instance() {
        let from = AbsResource::new(ModuleInstance::root(), "disk", "old");
        let to = AbsResource::new(ModuleInstance::root(), "disk", "new");

        let mut state = State::new();
        state.set_resource_instance(
            from.instance(InstanceKey::Int(0)),
            ResourceInstanceObject::ready(json!("zero")),
        );
        state.set_resource_instance(
            from.instance(InstanceKey::Int(1)),
            ResourceInstanceObject::ready(json!("one")),
        );

        let moved = state.move_resource(&from, &to);
        assert_eq!(moved.len(), 2);
        assert!(state.resource_instance(&from.instance(InstanceKey::Int(0))).is_none());
        assert_eq!(
            state
                .resource_instance(&to.instance(InstanceKey::Int(1)))
                .map(|o| o.value.clone()),
            Some(json!("one"))
        );
    }
}
