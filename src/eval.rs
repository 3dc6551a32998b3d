//! Expression evaluation contexts and scopes.
//!
//! The engine does not define an expression grammar; it exposes a narrow
//! "evaluation scope" capability instead. During a walk the
//! [`GraphWalker`](crate::graph::GraphWalker) creates one [`EvalContext`]
//! per module instance path and caches it for the life of the walk; a
//! [`Scope`] is the short-lived, read-only view handed to callers (and to
//! output nodes) for resolving references against the currently visible
//! state.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::addrs::{AbsResource, InstanceKey, ModuleInstance};
use crate::state::SyncState;
use crate::vars::InputValues;

/// The per-module-path evaluation context cached by a walker.
///
/// Cloning shares the context; output values recorded through one clone
/// are visible through all of them.
#[derive(Clone, Debug)]
pub struct EvalContext {
    module: ModuleInstance,
    state: SyncState,
    variables: InputValues,
    outputs: Arc<RwLock<FxHashMap<String, Value>>>,
}

impl EvalContext {
    #[must_use]
    pub fn new(module: ModuleInstance, state: SyncState, variables: InputValues) -> Self {
        Self {
            module,
            state,
            variables,
            outputs: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    #[must_use]
    pub fn module(&self) -> &ModuleInstance {
        &self.module
    }

    /// Record a resolved output value for this module.
    pub fn set_output(&self, name: impl Into<String>, value: Value) {
        self.outputs.write().insert(name.into(), value);
    }

    /// A read-only scope over whatever this context can currently see.
    #[must_use]
    pub fn evaluation_scope(&self) -> Scope {
        Scope {
            module: self.module.clone(),
            state: self.state.clone(),
            variables: self.variables.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

/// A read-only view bound to one module instance path, resolving
/// references against the state and variables visible at the end of the
/// walk that produced it. Resolution is best-effort: an unknown reference
/// is `None`, never an error.
#[derive(Clone, Debug)]
pub struct Scope {
    module: ModuleInstance,
    state: SyncState,
    variables: InputValues,
    outputs: Arc<RwLock<FxHashMap<String, Value>>>,
}

impl Scope {
    #[must_use]
    pub fn module(&self) -> &ModuleInstance {
        &self.module
    }

    /// Resolve a reference string against this scope.
    ///
    /// Supported forms: `var.NAME`, `output.NAME`, and resource instance
    /// references `TYPE.NAME`, `TYPE.NAME[N]`, or `TYPE.NAME["K"]`.
    #[must_use]
    pub fn resolve(&self, reference: &str) -> Option<Value> {
        if let Some(name) = reference.strip_prefix("var.") {
            return self.variables.get(name).map(|v| v.value.clone());
        }
        if let Some(name) = reference.strip_prefix("output.") {
            return self.outputs.read().get(name).cloned();
        }
        self.resolve_resource(reference)
    }

    fn resolve_resource(&self, reference: &str) -> Option<Value> {
        let (addr_part, key) = match reference.find('[') {
            Some(open) => {
                // The closing bracket must come after the opening one;
                // anything else is not an instance reference.
                let close = open + reference[open..].rfind(']')?;
                let key_text = &reference[open + 1..close];
                let key = if let Ok(n) = key_text.parse::<u64>() {
                    InstanceKey::Int(n)
                } else {
                    InstanceKey::Str(key_text.trim_matches('"').to_string())
                };
                (&reference[..open], key)
            }
            None => (reference, InstanceKey::NoKey),
        };

        let (type_name, name) = addr_part.split_once('.')?;
        let resource = AbsResource::new(self.module.clone(), type_name, name);
        self.state
            .resource_instance(&resource.instance(key))
            .map(|object| object.value)
    }
}
