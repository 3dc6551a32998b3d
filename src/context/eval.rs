//! Expression evaluation against an existing state snapshot.

use tracing::{debug, instrument};

use super::{Context, GraphWalkOpts};
use crate::addrs::ModuleInstance;
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::eval::Scope;
use crate::graph::{EvalGraphBuilder, GraphBuild, WalkOperation};
use crate::state::State;
use crate::vars::{merge_default_input_variable_values, InputValues};

impl Context {
    /// Evaluate outputs against `state` and return a scope bound to
    /// `module_addr` for resolving further expressions.
    ///
    /// Evaluation is best-effort: the scope is returned even when the
    /// walk reported errors, resolving whatever it can. Only a schema
    /// resolution failure yields no scope at all.
    #[instrument(skip_all)]
    pub async fn eval(
        &self,
        config: &Config,
        state: &State,
        module_addr: &ModuleInstance,
    ) -> (Option<Scope>, Diagnostics) {
        let _run = self.acquire_run("eval").await;
        let mut diags = Diagnostics::new();

        if self
            .schema_source
            .schemas(config, Some(state))
            .map_err(|schema_diags| diags.extend(schema_diags))
            .is_err()
        {
            return (None, diags);
        }

        let variables = merge_default_input_variable_values(
            InputValues::default(),
            &config.module.variables,
        );

        let (graph, build_diags) = EvalGraphBuilder {
            config: config.clone(),
        }
        .build();

        let walker = if build_diags.has_errors() {
            // A broken graph still leaves the state itself evaluable, so
            // fall back to a walker over the untouched snapshot.
            debug!("eval graph failed to build; evaluating against raw state");
            diags.extend(build_diags);
            self.graph_walker(
                WalkOperation::Eval,
                GraphWalkOpts {
                    input_state: state.deep_copy(),
                    root_variable_values: variables,
                    ..GraphWalkOpts::default()
                },
            )
        } else {
            let opts = GraphWalkOpts {
                input_state: state.deep_copy(),
                root_variable_values: variables,
                ..GraphWalkOpts::default()
            };
            let (walker, walk_diags) = self.walk(&graph, WalkOperation::Eval, opts).await;
            diags.extend(walker.take_non_fatal());
            diags.extend(walk_diags);
            walker
        };

        let scope = walker.enter_path(module_addr.clone()).evaluation_scope();
        (Some(scope), diags)
    }
}
