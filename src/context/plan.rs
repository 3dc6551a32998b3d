//! The planning entry point and its mode-specific strategies.
//!
//! `Context::plan` validates options, checks version requirements, and
//! merges variables before dispatching on the plan mode. All three modes
//! funnel into `plan_walk`, which owns the shared machinery: schema
//! resolution, the pre-walk move rewrite, graph construction, the walk
//! itself, and post-walk move validation.

use tracing::{debug, instrument};

use super::{Context, GraphWalkOpts};
use crate::config::Config;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::graph::builder::target_covers_resource;
use crate::graph::{DestroyPlanGraphBuilder, GraphBuild, PlanGraphBuilder, WalkOperation};
use crate::plan::{Changes, DynamicValue, Plan, PlanMode, PlanOpts};
use crate::refactoring::{apply_moves, find_move_statements, validate_moves};
use crate::state::State;
use crate::vars::{check_input_variables, merge_default_input_variable_values};
use crate::version::check_core_version_requirements;

impl Context {
    /// Plan the changes needed to converge on `config`, starting from
    /// `prev_run_state`.
    ///
    /// Degenerate callers may pass `None` for either input; both
    /// normalize to empty. On success the returned plan carries the
    /// proposed changes, both final state snapshots, and the serialized
    /// variable values. Errors before or during the walk return no plan;
    /// a variable value that fails to serialize afterwards only records
    /// an error and omits itself from the plan.
    #[instrument(skip_all)]
    pub async fn plan(
        &self,
        config: Option<&Config>,
        prev_run_state: Option<&State>,
        opts: Option<PlanOpts>,
    ) -> (Option<Plan>, Diagnostics) {
        let _run = self.acquire_run("plan").await;

        let empty_config = Config::empty();
        let config = config.unwrap_or(&empty_config);
        let empty_state = State::new();
        let prev_run_state = prev_run_state.unwrap_or(&empty_state);
        let opts = opts.unwrap_or_default();

        // A module written for a newer engine would fail in confusing
        // ways further in, so this check alone is fatal immediately.
        let mut diags = check_core_version_requirements(config);
        if diags.has_errors() {
            return (None, diags);
        }

        if opts.mode == PlanMode::RefreshOnly && opts.skip_refresh {
            diags.append(Diagnostic::bug(
                "Incompatible plan options",
                "Cannot skip refreshing in refresh-only mode.",
            ));
        }
        if opts.mode != PlanMode::Normal {
            for addr in &opts.force_replace {
                diags.append(Diagnostic::error(
                    "Unsupported plan option",
                    format!(
                        "Forcing the replacement of {addr} is allowed only in normal \
                         planning mode."
                    ),
                ));
            }
        }
        if diags.has_errors() {
            return (None, diags);
        }

        let variables =
            merge_default_input_variable_values(opts.set_variables.clone(), &config.module.variables);
        diags.extend(check_input_variables(&config.module.variables, &variables));
        if diags.has_errors() {
            return (None, diags);
        }

        if !opts.targets.is_empty() {
            diags.append(Diagnostic::warning(
                "Resource targeting is in effect",
                "You are creating a plan that targets specific resources. Targeting is \
                 meant for exceptional recovery situations only; the resulting state \
                 will be incomplete until a full plan is applied.",
            ));
        }

        let (plan, plan_diags) = match opts.mode {
            PlanMode::Normal => self.plan_normal(config, prev_run_state, &opts).await,
            PlanMode::RefreshOnly => self.refresh_only_plan(config, prev_run_state, &opts).await,
            PlanMode::Destroy => self.destroy_plan(config, prev_run_state, &opts).await,
        };
        diags.extend(plan_diags);
        if diags.has_errors() {
            return (None, diags);
        }
        let Some(mut plan) = plan else {
            return (None, diags);
        };

        diags.extend(record_variable_values(&variables, &mut plan));

        plan.target_addrs = opts.targets.clone();
        plan.provider_fingerprints = self.provider_fingerprints.clone();

        (Some(plan), diags)
    }

    async fn plan_normal(
        &self,
        config: &Config,
        prev_run_state: &State,
        opts: &PlanOpts,
    ) -> (Option<Plan>, Diagnostics) {
        let (mut plan, diags) = self.plan_walk(config, prev_run_state, opts).await;
        if let Some(plan) = plan.as_mut() {
            // Placeholders for pending creates exist only for the walk's
            // benefit; the prior state must describe real objects only.
            plan.prior_state.remove_planned_resource_instance_objects();
        }
        (plan, diags)
    }

    async fn refresh_only_plan(
        &self,
        config: &Config,
        prev_run_state: &State,
        opts: &PlanOpts,
    ) -> (Option<Plan>, Diagnostics) {
        let (mut plan, mut diags) = self.plan_walk(config, prev_run_state, opts).await;
        if let Some(plan) = plan.as_mut() {
            if !plan.changes.is_empty() {
                for change in &plan.changes.resources {
                    debug!(
                        addr = %change.addr,
                        deposed = %change.deposed_key,
                        action = %change.action,
                        "refresh-only plan proposed a change"
                    );
                }
                diags.append(Diagnostic::bug(
                    "Invalid refresh-only plan",
                    "The refresh-only plan includes resource changes, but a refresh-only \
                     plan must never propose any.",
                ));
            }
            plan.prior_state.remove_planned_resource_instance_objects();
        }
        (plan, diags)
    }

    /// Destroy planning runs in two phases: first a normal-mode plan to
    /// refresh state (unless refreshing is skipped), then the destroy
    /// walk itself. The destroy walk starts from the caller's state as
    /// given, which may be stale; the final plan carries the refresh
    /// phase's state snapshots so it still reports refreshed reality.
    async fn destroy_plan(
        &self,
        config: &Config,
        prev_run_state: &State,
        opts: &PlanOpts,
    ) -> (Option<Plan>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut refresh_phase: Option<Plan> = None;

        if !opts.skip_refresh {
            debug!("refreshing state before destroy planning");
            let mut refresh_opts = opts.clone();
            refresh_opts.mode = PlanMode::Normal;
            let (plan, refresh_diags) =
                self.plan_normal(config, prev_run_state, &refresh_opts).await;
            if refresh_diags.has_errors() {
                diags.extend(refresh_diags);
                return (None, diags);
            }
            diags.extend(refresh_diags);
            refresh_phase = plan;
        }

        let (plan, walk_diags) = self.plan_walk(config, prev_run_state, opts).await;
        diags.extend(walk_diags);
        if diags.has_errors() {
            return (None, diags);
        }
        let Some(mut plan) = plan else {
            return (None, diags);
        };

        if let Some(refresh_phase) = refresh_phase {
            // The destroy walk started from the possibly stale input
            // state; the plan must report the refreshed reality instead.
            plan.prior_state = refresh_phase.prior_state;
            plan.prev_run_state = refresh_phase.prev_run_state;
        }
        (Some(plan), diags)
    }

    /// The shared walk machinery behind every plan mode.
    async fn plan_walk(
        &self,
        config: &Config,
        prev_run_state: &State,
        opts: &PlanOpts,
    ) -> (Option<Plan>, Diagnostics) {
        let mut diags = Diagnostics::new();
        debug!(mode = %opts.mode, "building and walking plan graph");

        let schemas = match self.schema_source.schemas(config, Some(prev_run_state)) {
            Ok(schemas) => schemas,
            Err(schema_diags) => {
                diags.extend(schema_diags);
                return (None, diags);
            }
        };

        // Rewrite moved resource addresses before anything reads the
        // state; nodes and post-walk validation both consume the results.
        let mut prev_run_state = prev_run_state.deep_copy();
        let move_stmts = find_move_statements(config);
        let move_results = apply_moves(&move_stmts, &mut prev_run_state);

        if !opts.targets.is_empty() {
            // TODO: refuse to plan when the targets exclude the
            // destination of a move statement; the state rewrite has
            // already happened but the destination resource will not be
            // planned, leaving the move half applied.
            for stmt in &move_stmts {
                if !target_covers_resource(&opts.targets, &stmt.to) {
                    debug!(from = %stmt.from, to = %stmt.to, "move destination excluded by targeting");
                }
            }
        }

        let (graph, build_diags) = match opts.mode {
            PlanMode::Normal | PlanMode::RefreshOnly => PlanGraphBuilder {
                config: config.clone(),
                state: prev_run_state.deep_copy(),
                schemas,
                targets: opts.targets.clone(),
                force_replace: opts.force_replace.clone(),
                skip_refresh: opts.skip_refresh,
                skip_plan_changes: opts.mode == PlanMode::RefreshOnly,
            }
            .build(),
            PlanMode::Destroy => DestroyPlanGraphBuilder {
                config: config.clone(),
                state: prev_run_state.deep_copy(),
                schemas,
                targets: opts.targets.clone(),
            }
            .build(),
        };
        diags.extend(build_diags);
        if diags.has_errors() {
            return (None, diags);
        }

        let operation = if opts.mode == PlanMode::Destroy {
            WalkOperation::PlanDestroy
        } else {
            WalkOperation::Plan
        };
        let variables = merge_default_input_variable_values(
            opts.set_variables.clone(),
            &config.module.variables,
        );
        let walk_opts = GraphWalkOpts {
            input_state: prev_run_state,
            changes: Changes::new().sync_wrapper(),
            root_variable_values: variables,
            move_results,
        };

        let (walker, walk_diags) = self.walk(&graph, operation, walk_opts).await;
        diags.extend(walker.take_non_fatal());
        diags.extend(walk_diags);
        diags.extend(validate_moves(
            &move_stmts,
            config,
            &walker.expander.all_instances(),
        ));

        let plan = Plan {
            mode: opts.mode,
            changes: walker.changes.clone().close(),
            prior_state: walker.close_refresh_state(),
            prev_run_state: walker.close_prev_run_state(),
            ..Plan::default()
        };
        (Some(plan), diags)
    }
}

/// Serialize the variable values into the plan so a later apply can
/// reconstruct the run exactly. A value that fails to serialize records
/// an error diagnostic and omits itself; the plan itself survives.
pub(super) fn record_variable_values(
    variables: &crate::vars::InputValues,
    plan: &mut Plan,
) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let mut names: Vec<&String> = variables.keys().collect();
    names.sort();
    for name in names {
        match DynamicValue::from_value(&variables[name].value) {
            Ok(dv) => {
                plan.variable_values.insert(name.clone(), dv);
            }
            Err(err) => {
                diags.append(Diagnostic::error(
                    "Failed to prepare variable value for plan",
                    format!(
                        "The value for variable {name:?} could not be serialized to \
                         store in the plan: {err}."
                    ),
                ));
            }
        }
    }
    diags
}
