//! Concurrency-safe wrapper around a [`State`] snapshot.
//!
//! During a graph walk many nodes read and write the same state view at
//! once. `SyncState` serializes every access through one lock so no node
//! can observe another node's half-finished mutation. When a walk has
//! quiesced the wrapper is closed back into a plain immutable [`State`].

use parking_lot::Mutex;
use std::sync::Arc;

use super::{ResourceInstanceObject, State};
use crate::addrs::AbsResourceInstance;

/// Shared, serialized handle to one state view.
///
/// Cloning the handle shares the underlying state; every view used by a
/// walk gets its own wrapper over its own deep copy, never an alias of
/// another view's wrapper.
#[derive(Clone, Debug)]
pub struct SyncState {
    inner: Arc<Mutex<State>>,
}

impl SyncState {
    #[must_use]
    pub fn new(state: State) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Read one resource instance object, cloned out under the lock.
    #[must_use]
    pub fn resource_instance(&self, addr: &AbsResourceInstance) -> Option<ResourceInstanceObject> {
        self.inner.lock().resource_instance(addr).cloned()
    }

    /// Write one resource instance object.
    pub fn set_resource_instance(&self, addr: AbsResourceInstance, object: ResourceInstanceObject) {
        self.inner.lock().set_resource_instance(addr, object);
    }

    /// Remove one resource instance object, returning it if present.
    pub fn remove_resource_instance(
        &self,
        addr: &AbsResourceInstance,
    ) -> Option<ResourceInstanceObject> {
        self.inner.lock().remove_resource_instance(addr)
    }

    /// Run a closure against the locked state. The closure must not block
    /// or call back into this wrapper.
    pub fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// A deep copy of the current contents, taken under the lock.
    #[must_use]
    pub fn snapshot(&self) -> State {
        self.inner.lock().deep_copy()
    }

    /// Convert this synchronized view back into an immutable snapshot.
    ///
    /// Must only be called once all node execution against this view has
    /// quiesced; other outstanding handles keep working but their writes
    /// no longer reach the returned snapshot.
    #[must_use]
    pub fn close(self) -> State {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().deep_copy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{AbsResource, InstanceKey, ModuleInstance};
    use serde_json::json;

    fn addr() -> AbsResourceInstance {
        AbsResource::new(ModuleInstance::root(), "disk", "a").instance(InstanceKey::NoKey)
    }

    #[test]
    fn writes_are_visible_through_clones() {
        let sync = State::new().sync_wrapper();
        let other = sync.clone();
        other.set_resource_instance(addr(), ResourceInstanceObject::ready(json!(1)));
        assert_eq!(
            sync.resource_instance(&addr()).map(|o| o.value),
            Some(json!(1))
        );
    }

    #[test]
    fn close_returns_final_contents() {
        let sync = State::new().sync_wrapper();
        sync.set_resource_instance(addr(), ResourceInstanceObject::ready(json!("x")));
        let state = sync.close();
        assert_eq!(
            state.resource_instance(&addr()).map(|o| o.value.clone()),
            Some(json!("x"))
        );
    }

    #[tokio::test]
    async fn concurrent_writers_never_tear() {
        let sync = State::new().sync_wrapper();
        let mut handles = Vec::new();
        for i in 0..16u64 {
            let sync = sync.clone();
            handles.push(tokio::spawn(async move {
                let inst = AbsResource::new(ModuleInstance::root(), "disk", "many")
                    .instance(InstanceKey::Int(i));
                sync.set_resource_instance(inst, ResourceInstanceObject::ready(json!(i)));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let state = sync.close();
        assert_eq!(state.all_resource_instances().count(), 16);
    }
}
