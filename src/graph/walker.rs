//! The concurrent graph executor's shared environment.
//!
//! A [`GraphWalker`] holds everything one walk's nodes share: the active
//! state views behind their synchronized wrappers, the changes
//! accumulator, the instance expander, move results, variable values, the
//! cooperative stop signal, and the per-module evaluation context cache.
//! It is allocated fresh for every walk and owned by that walk alone;
//! nothing in it survives the call except values explicitly copied into
//! the returned plan or scope.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use tokio::sync::watch;

use crate::addrs::{ModuleInstance, UniqueKey};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::eval::EvalContext;
use crate::instances::InstanceExpander;
use crate::plan::SyncChanges;
use crate::provider::Components;
use crate::refactoring::MoveResult;
use crate::state::SyncState;
use crate::vars::InputValues;

/// The kinds of graph walk the engine performs. `Plan`, `PlanDestroy`,
/// `Validate`, and `Eval` are driven by the context entry points; `Apply`
/// exists for walks that execute a previously created plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkOperation {
    Validate,
    Plan,
    PlanDestroy,
    Eval,
    Apply,
}

impl fmt::Display for WalkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkOperation::Validate => write!(f, "validate"),
            WalkOperation::Plan => write!(f, "plan"),
            WalkOperation::PlanDestroy => write!(f, "plan-destroy"),
            WalkOperation::Eval => write!(f, "eval"),
            WalkOperation::Apply => write!(f, "apply"),
        }
    }
}

/// Shared execution environment for one graph walk.
pub struct GraphWalker {
    pub operation: WalkOperation,
    /// Working state: how things would look after applying, including
    /// placeholders for pending creates.
    pub state: SyncState,
    /// Refresh state: becomes the plan's prior state. Present only for
    /// validate and plan walks.
    pub refresh_state: Option<SyncState>,
    /// Previous-run state: never mutated by node execution after the
    /// pre-walk move rewrite. Present only for validate and plan walks.
    pub prev_run_state: Option<SyncState>,
    pub changes: SyncChanges,
    pub expander: InstanceExpander,
    pub move_results: FxHashMap<UniqueKey, MoveResult>,
    pub root_variable_values: InputValues,
    pub components: Components,
    stop: watch::Receiver<bool>,
    non_fatal: Mutex<Diagnostics>,
    eval_contexts: Mutex<FxHashMap<ModuleInstance, EvalContext>>,
}

impl GraphWalker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        operation: WalkOperation,
        state: SyncState,
        refresh_state: Option<SyncState>,
        prev_run_state: Option<SyncState>,
        changes: SyncChanges,
        move_results: FxHashMap<UniqueKey, MoveResult>,
        root_variable_values: InputValues,
        components: Components,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            operation,
            state,
            refresh_state,
            prev_run_state,
            changes,
            expander: InstanceExpander::new(),
            move_results,
            root_variable_values,
            components,
            stop,
            non_fatal: Mutex::new(Diagnostics::new()),
            eval_contexts: Mutex::new(FxHashMap::default()),
        }
    }

    /// Whether the caller has requested a cooperative stop. Nodes check
    /// this before starting external calls; the framework never kills
    /// node execution outright.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// The refresh state view. Only plan-shaped walks carry one; asking
    /// outside such a walk is a programmer error.
    #[must_use]
    pub fn refresh_view(&self) -> SyncState {
        self.refresh_state
            .clone()
            .expect("refresh state is only available during validate and plan walks")
    }

    /// Record a non-fatal diagnostic observed during node execution.
    pub fn push_non_fatal(&self, diag: Diagnostic) {
        self.non_fatal.lock().append(diag);
    }

    /// Drain the non-fatal diagnostics accumulated so far.
    #[must_use]
    pub fn take_non_fatal(&self) -> Diagnostics {
        std::mem::take(&mut *self.non_fatal.lock())
    }

    /// The evaluation context for one module instance path, created on
    /// first use and cached for the life of this walk.
    #[must_use]
    pub fn enter_path(&self, module: ModuleInstance) -> EvalContext {
        let mut contexts = self.eval_contexts.lock();
        contexts
            .entry(module.clone())
            .or_insert_with(|| {
                let variables = if module.is_root() {
                    self.root_variable_values.clone()
                } else {
                    InputValues::default()
                };
                EvalContext::new(module, self.state.clone(), variables)
            })
            .clone()
    }

    /// Close the refresh state into an immutable snapshot. Must only be
    /// called after node execution has quiesced.
    #[must_use]
    pub fn close_refresh_state(&self) -> crate::state::State {
        self.refresh_view().close()
    }

    /// Close the previous-run state into an immutable snapshot. Must only
    /// be called after node execution has quiesced.
    #[must_use]
    pub fn close_prev_run_state(&self) -> crate::state::State {
        self.prev_run_state
            .clone()
            .expect("previous-run state is only available during validate and plan walks")
            .close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Changes;
    use crate::state::State;

    fn walker(operation: WalkOperation) -> GraphWalker {
        let (_tx, rx) = watch::channel(false);
        GraphWalker::new(
            operation,
            State::new().sync_wrapper(),
            Some(State::new().sync_wrapper()),
            Some(State::new().sync_wrapper()),
            Changes::new().sync_wrapper(),
            FxHashMap::default(),
            InputValues::default(),
            Components::new(),
            rx,
        )
    }

    #[test]
    fn enter_path_caches_per_module() {
        let walker = walker(WalkOperation::Eval);
        let a = walker.enter_path(ModuleInstance::root());
        a.set_output("x", serde_json::json!(1));

        // Second entry returns the cached context with the output intact.
        let b = walker.enter_path(ModuleInstance::root());
        assert_eq!(
            b.evaluation_scope().resolve("output.x"),
            Some(serde_json::json!(1))
        );
    }

    #[test]
    fn non_fatal_diagnostics_drain_once() {
        let walker = walker(WalkOperation::Plan);
        walker.push_non_fatal(Diagnostic::warning("w", ""));
        assert_eq!(walker.take_non_fatal().len(), 1);
        assert!(walker.take_non_fatal().is_empty());
    }

    #[test]
    fn stop_signal_is_observable() {
        let (tx, rx) = watch::channel(false);
        let walker = GraphWalker::new(
            WalkOperation::Plan,
            State::new().sync_wrapper(),
            None,
            None,
            Changes::new().sync_wrapper(),
            FxHashMap::default(),
            InputValues::default(),
            Components::new(),
            rx,
        );
        assert!(!walker.stop_requested());
        tx.send(true).unwrap();
        assert!(walker.stop_requested());
    }
}
