//! Walk wiring: turning an assembled graph into a finished walk.
//!
//! This is where the state views for each walk operation are decided:
//! validate walks see three fresh empty states, plan walks get three
//! independent deep copies of the input state, and every other walk
//! shares a single view. The stop watcher is started before the first
//! node runs and shut down and joined before the walk returns.

use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

use super::Context;
use crate::addrs::UniqueKey;
use crate::diagnostics::Diagnostics;
use crate::graph::{Graph, GraphWalker, WalkOperation};
use crate::plan::SyncChanges;
use crate::refactoring::MoveResult;
use crate::state::State;
use crate::vars::InputValues;

/// Per-walk inputs gathered by an entry point before handing off to the
/// executor.
#[derive(Default)]
pub(crate) struct GraphWalkOpts {
    /// State the walk starts from, already rewritten by any move
    /// statements. Ignored by validate walks, which always start empty.
    pub input_state: State,
    pub changes: SyncChanges,
    pub root_variable_values: InputValues,
    pub move_results: FxHashMap<UniqueKey, MoveResult>,
}

impl Context {
    /// Execute `graph` to completion, returning the walker so the caller
    /// can harvest its state views and accumulated diagnostics.
    pub(crate) async fn walk(
        &self,
        graph: &Graph,
        operation: WalkOperation,
        opts: GraphWalkOpts,
    ) -> (Arc<GraphWalker>, Diagnostics) {
        debug!(%operation, "starting graph walk");

        let walker = self.graph_walker(operation, opts);
        let (done_tx, watcher) = self.watch_stop();

        let diags = graph.walk(Arc::clone(&walker)).await;

        // Shut the stop watcher down and join it so nothing it might do
        // outlives the walk.
        let _ = done_tx.send(());
        if watcher.await.is_err() {
            debug!("stop watcher did not shut down cleanly");
        }

        (walker, diags)
    }

    /// Wire up the walker for one operation, including its state views.
    pub(crate) fn graph_walker(&self, operation: WalkOperation, opts: GraphWalkOpts) -> Arc<GraphWalker> {
        let (state, refresh_state, prev_run_state) = match operation {
            // Validation must not depend on any existing state.
            WalkOperation::Validate => (
                State::new().sync_wrapper(),
                Some(State::new().sync_wrapper()),
                Some(State::new().sync_wrapper()),
            ),
            // Plan walks mutate the working and refresh views while the
            // previous-run view stays frozen; each gets an independent
            // deep copy so none can alias another.
            WalkOperation::Plan | WalkOperation::PlanDestroy => (
                opts.input_state.deep_copy().sync_wrapper(),
                Some(opts.input_state.deep_copy().sync_wrapper()),
                Some(opts.input_state.sync_wrapper()),
            ),
            WalkOperation::Eval | WalkOperation::Apply => {
                (opts.input_state.sync_wrapper(), None, None)
            }
        };

        Arc::new(GraphWalker::new(
            operation,
            state,
            refresh_state,
            prev_run_state,
            opts.changes,
            opts.move_results,
            opts.root_variable_values,
            self.components.clone(),
            self.stop_receiver(),
        ))
    }
}
