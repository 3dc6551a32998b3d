//! Graph node types: the units of work a walk executes.
//!
//! Every node implements [`GraphNode`]: given the walker's shared
//! environment and the walk operation, do the work and report
//! diagnostics. Nodes touch shared state only through the walker's
//! synchronized wrappers and must honor the cooperative stop signal
//! before starting external calls.

use async_trait::async_trait;
use tracing::debug;

use super::walker::{GraphWalker, WalkOperation};
use crate::addrs::{AbsResource, AbsResourceInstance, InstanceKey, ModuleInstance};
use crate::config::{OutputConfig, ResourceConfig};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::instances::Expansion;
use crate::plan::{ChangeAction, ResourceChange};
use crate::schemas::ProviderSchema;
use crate::state::{DeposedKey, ResourceInstanceObject};

/// One unit of planned or evaluated work with explicit dependencies.
#[async_trait]
pub trait GraphNode: Send + Sync {
    /// Stable name for logs and cycle diagnostics.
    fn name(&self) -> String;

    /// Execute this node against the walk's shared environment.
    async fn execute(&self, walker: &GraphWalker) -> Diagnostics;
}

/// Declares a root module input variable. By the time a walk starts the
/// context has merged and checked all variable values, so a missing value
/// here is a defect upstream, not user error.
pub struct NodeRootVariable {
    pub name: String,
}

#[async_trait]
impl GraphNode for NodeRootVariable {
    fn name(&self) -> String {
        format!("var.{}", self.name)
    }

    async fn execute(&self, walker: &GraphWalker) -> Diagnostics {
        debug!(name = %self.name, "evaluating root variable");
        let mut diags = Diagnostics::new();
        if !walker.root_variable_values.contains_key(&self.name) {
            diags.append(Diagnostic::bug(
                "Root variable not resolved",
                format!(
                    "The variable {:?} reached the graph walk without a value.",
                    self.name
                ),
            ));
        }
        diags
    }
}

/// Validates one provider configuration against the resolved schemas.
/// The schema lookup happens at graph build time; the node carries the
/// outcome so execution stays cheap.
pub struct NodeProviderConfig {
    pub name: String,
    pub schema: Option<ProviderSchema>,
}

#[async_trait]
impl GraphNode for NodeProviderConfig {
    fn name(&self) -> String {
        format!("provider.{}", self.name)
    }

    async fn execute(&self, _walker: &GraphWalker) -> Diagnostics {
        debug!(provider = %self.name, "configuring provider");
        let mut diags = Diagnostics::new();
        if self.schema.is_none() {
            diags.append(Diagnostic::error(
                "Provider not available",
                format!(
                    "No schema was resolved for provider {:?}; it is not installed or not \
                     declared.",
                    self.name
                ),
            ));
        }
        diags
    }
}

/// Plans one configured resource: registers its instance expansion, then
/// refreshes and diffs each concrete instance.
pub struct NodeResource {
    pub module: ModuleInstance,
    pub config: ResourceConfig,
    pub skip_refresh: bool,
    /// Refresh-only mode: refresh state but never compute changes.
    pub skip_plan_changes: bool,
    pub force_replace: Vec<AbsResourceInstance>,
}

impl NodeResource {
    fn resource(&self) -> AbsResource {
        AbsResource::new(
            self.module.clone(),
            &self.config.type_name,
            &self.config.name,
        )
    }

    /// Refresh one instance against real infrastructure, updating the
    /// refresh state view. Returns the refreshed object, or the prior one
    /// when refresh is skipped or the stop signal is already raised.
    async fn refresh_instance(
        &self,
        walker: &GraphWalker,
        addr: &AbsResourceInstance,
        prior: Option<ResourceInstanceObject>,
    ) -> Option<ResourceInstanceObject> {
        let Some(prior) = prior else { return None };
        if self.skip_refresh || walker.stop_requested() {
            return Some(prior);
        }
        let Some(provider) = walker.components.provider(&self.config.provider) else {
            return Some(prior);
        };
        match provider.refresh(addr, prior.clone()).await {
            Ok(Some(refreshed)) => {
                walker
                    .refresh_view()
                    .set_resource_instance(addr.clone(), refreshed.clone());
                Some(refreshed)
            }
            Ok(None) => {
                debug!(%addr, "object no longer exists; removing from refresh state");
                walker.refresh_view().remove_resource_instance(addr);
                None
            }
            Err(err) => {
                // Planning continues with the stale prior object; the
                // walk surfaces the read failure at the end.
                walker.push_non_fatal(Diagnostic::error(
                    "Failed to refresh resource instance",
                    format!("Could not read the current object for {addr}: {err}."),
                ));
                Some(prior)
            }
        }
    }

    async fn plan_instance(&self, walker: &GraphWalker, key: InstanceKey) {
        let addr = self.resource().instance(key);
        let prior = walker.refresh_view().resource_instance(&addr);
        let refreshed = self.refresh_instance(walker, &addr, prior).await;

        if self.skip_plan_changes {
            return;
        }

        let action = match &refreshed {
            None => ChangeAction::Create,
            Some(_) if self.force_replace.contains(&addr) => ChangeAction::Replace,
            Some(object) if object.value != self.config.config => ChangeAction::Update,
            Some(_) => ChangeAction::NoOp,
        };
        debug!(%addr, %action, "planned resource instance");

        match action {
            ChangeAction::Create | ChangeAction::Replace => {
                // Placeholder so later nodes can reason about the pending
                // create; stripped from the prior state after the walk.
                let placeholder = ResourceInstanceObject::planned(self.config.config.clone());
                walker
                    .state
                    .set_resource_instance(addr.clone(), placeholder.clone());
                walker
                    .refresh_view()
                    .set_resource_instance(addr.clone(), placeholder);
            }
            ChangeAction::Update => {
                walker.state.set_resource_instance(
                    addr.clone(),
                    ResourceInstanceObject::ready(self.config.config.clone()),
                );
            }
            ChangeAction::NoOp | ChangeAction::Delete => {}
        }

        walker.changes.append(ResourceChange {
            addr,
            deposed_key: DeposedKey::NotDeposed,
            action,
        });
    }
}

#[async_trait]
impl GraphNode for NodeResource {
    fn name(&self) -> String {
        self.resource().to_string()
    }

    async fn execute(&self, walker: &GraphWalker) -> Diagnostics {
        let resource = self.resource();
        let expansion = Expansion::from(&self.config.expansion);
        let keys = expansion.instance_keys();
        walker.expander.set_resource_expansion(resource, expansion);

        let mut diags = Diagnostics::new();
        match walker.operation {
            WalkOperation::Validate => {
                if self.config.config.is_null() {
                    diags.append(Diagnostic::error(
                        "Missing resource configuration",
                        format!("Resource {} has no configuration body.", self.name()),
                    ));
                }
            }
            WalkOperation::Plan => {
                for key in keys {
                    self.plan_instance(walker, key).await;
                }
            }
            // Resource nodes are only built into validate and plan
            // graphs; other operations never reach here.
            WalkOperation::PlanDestroy | WalkOperation::Eval | WalkOperation::Apply => {
                unreachable!("resource node executed during {} walk", walker.operation)
            }
        }
        diags
    }
}

/// Plans the deletion of resource instances present in state but no
/// longer declared in configuration.
pub struct NodeResourceOrphan {
    pub resource: AbsResource,
    pub keys: Vec<InstanceKey>,
    pub skip_plan_changes: bool,
}

#[async_trait]
impl GraphNode for NodeResourceOrphan {
    fn name(&self) -> String {
        format!("{} (orphan)", self.resource)
    }

    async fn execute(&self, walker: &GraphWalker) -> Diagnostics {
        debug!(resource = %self.resource, "planning orphaned resource");
        if self.skip_plan_changes {
            // Refresh-only: orphans stay in state untouched and produce
            // no change entries.
            return Diagnostics::new();
        }
        for key in &self.keys {
            let addr = self.resource.instance(key.clone());
            if walker.refresh_view().resource_instance(&addr).is_none() {
                continue;
            }
            walker.state.remove_resource_instance(&addr);
            walker.changes.append(ResourceChange {
                addr,
                deposed_key: DeposedKey::NotDeposed,
                action: ChangeAction::Delete,
            });
        }
        Diagnostics::new()
    }
}

/// Plans the destruction of every instance of one resource recorded in
/// state. Destroy plans only ever propose deletions.
pub struct NodeDestroyResource {
    pub resource: AbsResource,
    pub keys: Vec<InstanceKey>,
}

#[async_trait]
impl GraphNode for NodeDestroyResource {
    fn name(&self) -> String {
        format!("{} (destroy)", self.resource)
    }

    async fn execute(&self, walker: &GraphWalker) -> Diagnostics {
        walker.expander.set_resource_expansion(
            self.resource.clone(),
            Expansion::Explicit(self.keys.clone()),
        );
        for key in &self.keys {
            let addr = self.resource.instance(key.clone());
            if walker.refresh_view().resource_instance(&addr).is_none() {
                continue;
            }
            debug!(%addr, "planned destroy");
            walker.state.remove_resource_instance(&addr);
            walker.changes.append(ResourceChange {
                addr,
                deposed_key: DeposedKey::NotDeposed,
                action: ChangeAction::Delete,
            });
        }
        Diagnostics::new()
    }
}

/// Resolves one output expression through the module's evaluation scope.
/// Resolution is best-effort; unresolved references are skipped so that
/// partially evaluable configurations still produce everything they can.
pub struct NodeOutput {
    pub module: ModuleInstance,
    pub config: OutputConfig,
}

#[async_trait]
impl GraphNode for NodeOutput {
    fn name(&self) -> String {
        if self.module.is_root() {
            format!("output.{}", self.config.name)
        } else {
            format!("{}.output.{}", self.module, self.config.name)
        }
    }

    async fn execute(&self, walker: &GraphWalker) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if self.config.expr.is_empty() {
            diags.append(Diagnostic::error(
                "Invalid output expression",
                format!("The output {:?} has an empty expression.", self.config.name),
            ));
            return diags;
        }

        let ctx = walker.enter_path(self.module.clone());
        match ctx.evaluation_scope().resolve(&self.config.expr) {
            Some(value) => ctx.set_output(self.config.name.clone(), value),
            None => debug!(
                output = %self.config.name,
                expr = %self.config.expr,
                "output expression did not resolve; leaving unset"
            ),
        }
        diags
    }
}
