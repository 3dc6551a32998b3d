//! Move statement refactoring: the pre-walk state rewrite and the
//! post-walk validation.
//!
//! Before a plan walk, `moved` blocks declared in configuration are
//! collected into absolute [`MoveStatement`]s and applied against the
//! previous-run state, rewriting instance addresses in place. The results
//! feed two consumers: graph nodes, which look changes up by the moved
//! source address, and the post-walk validation, which confirms each
//! destination actually exists in the expanded instance set.

use rustc_hash::FxHashMap;

use crate::addrs::{AbsResource, AbsResourceInstance, UniqueKey};
use crate::config::Config;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::state::State;

/// One move statement, absolutized against the module that declared it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveStatement {
    pub from: AbsResource,
    pub to: AbsResource,
}

/// The outcome of applying one move statement to one state instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveResult {
    pub from: AbsResourceInstance,
    pub to: AbsResourceInstance,
}

/// Collect every `moved` block in the configuration tree as an absolute
/// move statement.
#[must_use]
pub fn find_move_statements(config: &Config) -> Vec<MoveStatement> {
    let mut stmts = Vec::new();
    config.visit_modules(|path, module| {
        for block in &module.moved {
            stmts.push(MoveStatement {
                from: AbsResource::new(path.clone(), &block.from_type, &block.from_name),
                to: AbsResource::new(path.clone(), &block.to_type, &block.to_name),
            });
        }
    });
    stmts
}

/// Apply move statements against the previous-run state, rewriting moved
/// instance addresses in place. Returns one [`MoveResult`] per moved
/// instance, keyed by the source address's unique key.
pub fn apply_moves(
    stmts: &[MoveStatement],
    state: &mut State,
) -> FxHashMap<UniqueKey, MoveResult> {
    let mut results = FxHashMap::default();
    for stmt in stmts {
        for (from, to) in state.move_resource(&stmt.from, &stmt.to) {
            tracing::debug!(%from, %to, "moved resource instance state");
            results.insert(from.unique_key(), MoveResult { from, to });
        }
    }
    results
}

/// Validate move statements against the final expanded instance set of a
/// finished walk: every destination resource must have at least one
/// actual instance, otherwise the move points at nothing and the state
/// it carried would be silently abandoned.
#[must_use]
pub fn validate_moves(
    stmts: &[MoveStatement],
    _config: &Config,
    all_instances: &[AbsResourceInstance],
) -> Diagnostics {
    let mut diags = Diagnostics::new();
    for stmt in stmts {
        let destination_exists = all_instances
            .iter()
            .any(|inst| inst.resource == stmt.to);
        if !destination_exists {
            diags.append(Diagnostic::error(
                "Moved resource does not exist",
                format!(
                    "The move from {} targets {}, but the configuration declares no such \
                     resource instance.",
                    stmt.from, stmt.to,
                ),
            ));
        }
    }
    diags
}
