//! Graph builders: one per kind of walk.
//!
//! A builder takes configuration, state, and resolved schemas and
//! assembles the node set and dependency edges for its operation. The
//! edges encode evaluation order only; builders do not execute anything.
//! Every builder ends with an acyclicity check so a malformed graph is
//! reported before any node runs.

use tracing::debug;

use super::node::{
    NodeDestroyResource, NodeOutput, NodeProviderConfig, NodeResource, NodeResourceOrphan,
    NodeRootVariable,
};
use super::Graph;
use crate::addrs::{AbsResource, AbsResourceInstance, InstanceKey, ModuleInstance, Targetable};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::schemas::Schemas;
use crate::state::State;

/// Capability for assembling the graph of one walk.
pub trait GraphBuild {
    /// Build the graph. Diagnostics report construction problems such as
    /// dependency cycles; a graph returned alongside errors must not be
    /// walked.
    fn build(&self) -> (Graph, Diagnostics);
}

/// Whether any target covers the given resource. An empty target set
/// covers everything.
pub(crate) fn target_covers_resource(targets: &[Targetable], resource: &AbsResource) -> bool {
    if targets.is_empty() {
        return true;
    }
    targets.iter().any(|target| match target {
        Targetable::Module(module) => resource.module.steps().starts_with(module.steps()),
        Targetable::Resource(res) => res == resource,
        Targetable::ResourceInstance(inst) => inst.resource == *resource,
    })
}

/// The instance keys recorded in state for one resource, sorted.
fn state_instance_keys(state: &State, resource: &AbsResource) -> Vec<InstanceKey> {
    let mut keys: Vec<InstanceKey> = state
        .all_resource_instances()
        .filter(|(addr, _)| addr.resource == *resource)
        .map(|(addr, _)| addr.key.clone())
        .collect();
    keys.sort();
    keys
}

/// Root variable names declared in the root module, sorted for a stable
/// node order.
fn sorted_root_variable_names(config: &Config) -> Vec<String> {
    let mut names: Vec<String> = config.module.variables.keys().cloned().collect();
    names.sort();
    names
}

/// Distinct provider names referenced by configured resources, sorted.
fn sorted_provider_names(config: &Config) -> Vec<String> {
    let mut names = Vec::new();
    config.visit_modules(|_, module| {
        for resource in &module.resources {
            if !names.contains(&resource.provider) {
                names.push(resource.provider.clone());
            }
        }
    });
    names.sort();
    names
}

/// Builds the graph for a normal (or refresh-only) plan walk: variables,
/// provider configurations, configured resources, orphaned state
/// resources, and outputs.
pub struct PlanGraphBuilder {
    pub config: Config,
    pub state: State,
    pub schemas: Schemas,
    pub targets: Vec<Targetable>,
    pub force_replace: Vec<AbsResourceInstance>,
    pub skip_refresh: bool,
    /// Refresh-only plans walk the same graph but never emit changes.
    pub skip_plan_changes: bool,
}

impl GraphBuild for PlanGraphBuilder {
    fn build(&self) -> (Graph, Diagnostics) {
        let mut graph = Graph::new();

        let variable_nodes: Vec<usize> = sorted_root_variable_names(&self.config)
            .into_iter()
            .map(|name| graph.add_node(NodeRootVariable { name }))
            .collect();

        let mut provider_nodes = Vec::new();
        for name in sorted_provider_names(&self.config) {
            let schema = self.schemas.provider(&name).cloned();
            let idx = graph.add_node(NodeProviderConfig {
                name: name.clone(),
                schema,
            });
            provider_nodes.push((name, idx));
        }
        let provider_node =
            |name: &str| provider_nodes.iter().find(|(n, _)| n == name).map(|(_, i)| *i);

        // Resource nodes, remembering per-module indices for output edges
        // and the declared resource set for orphan detection.
        let mut declared = Vec::new();
        let mut module_resource_nodes: Vec<(ModuleInstance, usize)> = Vec::new();
        self.config.visit_modules(|path, module| {
            for rc in &module.resources {
                let resource = AbsResource::new(path.clone(), &rc.type_name, &rc.name);
                declared.push(resource.clone());
                if !target_covers_resource(&self.targets, &resource) {
                    debug!(%resource, "resource excluded by targeting");
                    continue;
                }
                let idx = graph.add_node(NodeResource {
                    module: path.clone(),
                    config: rc.clone(),
                    skip_refresh: self.skip_refresh,
                    skip_plan_changes: self.skip_plan_changes,
                    force_replace: self.force_replace.clone(),
                });
                for &var in &variable_nodes {
                    graph.add_dependency(idx, var);
                }
                if let Some(provider) = provider_node(&rc.provider) {
                    graph.add_dependency(idx, provider);
                }
                module_resource_nodes.push((path.clone(), idx));
            }
        });

        // Resources present in state but no longer configured plan as
        // deletions.
        for resource in self.state.all_resources() {
            if declared.contains(&resource) {
                continue;
            }
            if !target_covers_resource(&self.targets, &resource) {
                continue;
            }
            let keys = state_instance_keys(&self.state, &resource);
            graph.add_node(NodeResourceOrphan {
                resource,
                keys,
                skip_plan_changes: self.skip_plan_changes,
            });
        }

        // Outputs run after every resource in their module so the state
        // they read reflects this walk's work.
        self.config.visit_modules(|path, module| {
            for oc in &module.outputs {
                let idx = graph.add_node(NodeOutput {
                    module: path.clone(),
                    config: oc.clone(),
                });
                for &var in &variable_nodes {
                    graph.add_dependency(idx, var);
                }
                for &(ref module_path, res_idx) in &module_resource_nodes {
                    if module_path == path {
                        graph.add_dependency(idx, res_idx);
                    }
                }
            }
        });

        let diags = graph.check_acyclic();
        (graph, diags)
    }
}

/// Builds the graph for a destroy plan walk: everything recorded in state
/// becomes a destroy node, regardless of whether it is still configured.
pub struct DestroyPlanGraphBuilder {
    pub config: Config,
    pub state: State,
    pub schemas: Schemas,
    pub targets: Vec<Targetable>,
}

impl GraphBuild for DestroyPlanGraphBuilder {
    fn build(&self) -> (Graph, Diagnostics) {
        let mut graph = Graph::new();

        let mut provider_nodes = Vec::new();
        for name in sorted_provider_names(&self.config) {
            let schema = self.schemas.provider(&name).cloned();
            let idx = graph.add_node(NodeProviderConfig {
                name: name.clone(),
                schema,
            });
            provider_nodes.push((name, idx));
        }

        // Provider name per declared resource, for destroy ordering edges.
        let mut declared_providers: Vec<(AbsResource, String)> = Vec::new();
        self.config.visit_modules(|path, module| {
            for rc in &module.resources {
                declared_providers.push((
                    AbsResource::new(path.clone(), &rc.type_name, &rc.name),
                    rc.provider.clone(),
                ));
            }
        });

        for resource in self.state.all_resources() {
            if !target_covers_resource(&self.targets, &resource) {
                debug!(%resource, "resource excluded by targeting");
                continue;
            }
            let keys = state_instance_keys(&self.state, &resource);
            let idx = graph.add_node(NodeDestroyResource {
                resource: resource.clone(),
                keys,
            });
            let provider = declared_providers
                .iter()
                .find(|(r, _)| *r == resource)
                .and_then(|(_, name)| provider_nodes.iter().find(|(n, _)| n == name));
            if let Some(&(_, provider_idx)) = provider {
                graph.add_dependency(idx, provider_idx);
            }
        }

        let diags = graph.check_acyclic();
        (graph, diags)
    }
}

/// Builds the graph for an expression evaluation walk: variables and
/// outputs only, reading an already-settled state.
pub struct EvalGraphBuilder {
    pub config: Config,
}

impl GraphBuild for EvalGraphBuilder {
    fn build(&self) -> (Graph, Diagnostics) {
        let mut graph = Graph::new();

        let variable_nodes: Vec<usize> = sorted_root_variable_names(&self.config)
            .into_iter()
            .map(|name| graph.add_node(NodeRootVariable { name }))
            .collect();

        self.config.visit_modules(|path, module| {
            for oc in &module.outputs {
                let idx = graph.add_node(NodeOutput {
                    module: path.clone(),
                    config: oc.clone(),
                });
                for &var in &variable_nodes {
                    graph.add_dependency(idx, var);
                }
            }
        });

        let diags = graph.check_acyclic();
        (graph, diags)
    }
}

/// The builder for a validate walk: the plan graph over an empty state,
/// with refresh and change planning disabled.
#[must_use]
pub fn validate_graph_builder(config: &Config, schemas: &Schemas) -> PlanGraphBuilder {
    PlanGraphBuilder {
        config: config.clone(),
        state: State::new(),
        schemas: schemas.clone(),
        targets: Vec::new(),
        force_replace: Vec::new(),
        skip_refresh: true,
        skip_plan_changes: true,
    }
}
