//! The per-walk accumulator of planned resource changes.
//!
//! Nodes append one [`ResourceChange`] per resource instance they plan.
//! During the walk the collection lives behind [`SyncChanges`] so
//! concurrently executing nodes can append without racing; once the walk
//! quiesces it is closed back into a plain [`Changes`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::addrs::AbsResourceInstance;
use crate::state::DeposedKey;

/// The action a plan proposes for one resource instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeAction {
    NoOp,
    Create,
    Update,
    Delete,
    Replace,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::NoOp => write!(f, "no-op"),
            ChangeAction::Create => write!(f, "create"),
            ChangeAction::Update => write!(f, "update"),
            ChangeAction::Delete => write!(f, "delete"),
            ChangeAction::Replace => write!(f, "replace"),
        }
    }
}

/// One planned change for one resource instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub addr: AbsResourceInstance,
    /// Which object of the instance this change targets: the current one,
    /// or a deposed object awaiting destruction.
    pub deposed_key: DeposedKey,
    pub action: ChangeAction,
}

/// All resource changes produced by one plan walk.
///
/// For a refresh-only plan this collection must end empty; the planning
/// layer checks that invariant after the walk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Changes {
    pub resources: Vec<ResourceChange>,
}

impl Changes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Wrap for serialized appends from concurrent graph nodes.
    #[must_use]
    pub fn sync_wrapper(self) -> SyncChanges {
        SyncChanges {
            inner: Arc::new(Mutex::new(self)),
        }
    }
}

/// Shared, serialized handle to the changes accumulator for one walk.
#[derive(Clone, Debug)]
pub struct SyncChanges {
    inner: Arc<Mutex<Changes>>,
}

impl Default for SyncChanges {
    fn default() -> Self {
        Changes::new().sync_wrapper()
    }
}

impl SyncChanges {
    /// Append one planned change.
    pub fn append(&self, change: ResourceChange) {
        self.inner.lock().resources.push(change);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().resources.is_empty()
    }

    /// Convert back into a plain collection once the walk has quiesced.
    #[must_use]
    pub fn close(self) -> Changes {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        }
    }
}
