use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::Context;
use crate::addrs::{AbsResource, InstanceKey, ModuleInstance, Targetable};
use crate::config::{
    Config, ExpansionDecl, MovedBlock, OutputConfig, ResourceConfig, VariableDecl,
};
use crate::diagnostics::Diagnostics;
use crate::plan::{ChangeAction, Plan, PlanMode, PlanOpts};
use crate::provider::{NoopProvider, ProviderError, ResourceProvider};
use crate::schemas::{SchemaSource, Schemas, StaticSchemaSource};
use crate::state::{ObjectStatus, ResourceInstanceObject, State};
use crate::vars::{InputValue, InputValues};
use crate::version::CoreVersion;

fn disk(name: &str) -> AbsResource {
    AbsResource::new(ModuleInstance::root(), "disk", name)
}

fn disk_config(name: &str, body: serde_json::Value) -> ResourceConfig {
    ResourceConfig {
        type_name: "disk".into(),
        name: name.into(),
        provider: "null".into(),
        expansion: ExpansionDecl::Single,
        config: body,
    }
}

fn one_resource_config() -> Config {
    let mut config = Config::empty();
    config.module.resources.push(disk_config("a", json!({"size": 1})));
    config
}

fn test_context() -> Context {
    Context::builder()
        .with_provider("null", Arc::new(NoopProvider))
        .with_schema_source(Arc::new(StaticSchemaSource::with_providers(&["null"])))
        .build()
}

struct CountingSchemaSource {
    calls: AtomicUsize,
}

impl SchemaSource for Arc<CountingSchemaSource> {
    fn schemas(&self, _config: &Config, _state: Option<&State>) -> Result<Schemas, Diagnostics> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Schemas::default())
    }
}

#[tokio::test]
async fn version_requirement_failure_is_fatal_before_schemas() {
    let counter = Arc::new(CountingSchemaSource {
        calls: AtomicUsize::new(0),
    });
    let ctx = Context::builder()
        .with_schema_source(Arc::new(Arc::clone(&counter)))
        .build();

    let mut config = one_resource_config();
    config.required_core_version = Some(CoreVersion::new(99, 0, 0));

    let (plan, diags) = ctx.plan(Some(&config), None, None).await;
    assert!(plan.is_none());
    assert!(diags.has_errors());
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);

    let diags = ctx.validate(&config).await;
    assert!(diags.has_errors());
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refresh_only_cannot_skip_refresh() {
    let ctx = test_context();
    let opts = PlanOpts {
        mode: PlanMode::RefreshOnly,
        skip_refresh: true,
        ..PlanOpts::default()
    };
    let (plan, diags) = ctx.plan(Some(&one_resource_config()), None, Some(opts)).await;
    assert!(plan.is_none());
    assert_eq!(diags.errors().count(), 1);
    let diag = diags.errors().next().unwrap();
    assert_eq!(diag.summary, "Incompatible plan options");
    assert!(diag.detail.contains("bug"));
}

#[tokio::test]
async fn force_replace_requires_normal_mode() {
    let ctx = test_context();
    let opts = PlanOpts {
        mode: PlanMode::Destroy,
        force_replace: vec![disk("a").instance(InstanceKey::NoKey)],
        ..PlanOpts::default()
    };
    let (plan, diags) = ctx.plan(Some(&one_resource_config()), None, Some(opts)).await;
    assert!(plan.is_none());
    assert!(diags
        .errors()
        .any(|d| d.summary == "Unsupported plan option"));
}

#[tokio::test]
async fn plan_with_no_prior_state_creates_everything() {
    let ctx = test_context();
    let (plan, diags) = ctx.plan(Some(&one_resource_config()), None, None).await;
    assert!(!diags.has_errors());

    let plan = plan.unwrap();
    assert_eq!(plan.mode, PlanMode::Normal);
    assert_eq!(plan.changes.len(), 1);
    let change = &plan.changes.resources[0];
    assert_eq!(change.action, ChangeAction::Create);
    assert_eq!(change.addr, disk("a").instance(InstanceKey::NoKey));
    assert!(plan.prev_run_state.is_empty());
}

#[tokio::test]
async fn prior_state_never_contains_planned_placeholders() {
    let ctx = test_context();
    let (plan, _) = ctx.plan(Some(&one_resource_config()), None, None).await;
    let plan = plan.unwrap();
    assert!(plan
        .prior_state
        .all_resource_instances()
        .all(|(_, object)| object.status != ObjectStatus::Planned));
}

#[tokio::test]
async fn unchanged_instances_plan_as_no_ops() {
    let ctx = test_context();
    let mut state = State::new();
    state.set_resource_instance(
        disk("a").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 1})),
    );

    let (plan, diags) = ctx.plan(Some(&one_resource_config()), Some(&state), None).await;
    assert!(!diags.has_errors());
    let plan = plan.unwrap();
    assert_eq!(plan.changes.len(), 1);
    assert_eq!(plan.changes.resources[0].action, ChangeAction::NoOp);
    assert!(!plan.prev_run_state.is_empty());
}

#[tokio::test]
async fn drifted_instances_plan_as_updates() {
    let ctx = test_context();
    let mut state = State::new();
    state.set_resource_instance(
        disk("a").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 99})),
    );

    let (plan, _) = ctx.plan(Some(&one_resource_config()), Some(&state), None).await;
    assert_eq!(plan.unwrap().changes.resources[0].action, ChangeAction::Update);
}

#[tokio::test]
async fn orphaned_state_resources_plan_as_deletions() {
    let ctx = test_context();
    let mut state = State::new();
    state.set_resource_instance(
        disk("gone").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 1})),
    );

    let (plan, diags) = ctx.plan(Some(&one_resource_config()), Some(&state), None).await;
    assert!(!diags.has_errors());
    let plan = plan.unwrap();
    let actions: Vec<(String, ChangeAction)> = plan
        .changes
        .resources
        .iter()
        .map(|c| (c.addr.to_string(), c.action))
        .collect();
    assert!(actions.contains(&("disk.a".into(), ChangeAction::Create)));
    assert!(actions.contains(&("disk.gone".into(), ChangeAction::Delete)));
}

#[tokio::test]
async fn refresh_only_plan_yields_no_changes() {
    let ctx = test_context();
    let mut state = State::new();
    state.set_resource_instance(
        disk("a").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 99})),
    );

    let opts = PlanOpts {
        mode: PlanMode::RefreshOnly,
        ..PlanOpts::default()
    };
    let (plan, diags) = ctx
        .plan(Some(&one_resource_config()), Some(&state), Some(opts))
        .await;
    assert!(!diags.has_errors());
    let plan = plan.unwrap();
    assert!(plan.changes.is_empty());
    // Refresh still ran: the prior state reflects the remote object.
    assert!(plan
        .prior_state
        .resource_instance(&disk("a").instance(InstanceKey::NoKey))
        .is_some());
}

#[tokio::test]
async fn destroy_plan_deletes_state_and_keeps_refreshed_snapshots() {
    let ctx = test_context();
    let mut state = State::new();
    state.set_resource_instance(
        disk("a").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 1})),
    );

    let opts = PlanOpts {
        mode: PlanMode::Destroy,
        ..PlanOpts::default()
    };
    let (plan, diags) = ctx
        .plan(Some(&one_resource_config()), Some(&state), Some(opts))
        .await;
    assert!(!diags.has_errors());
    let plan = plan.unwrap();
    assert_eq!(plan.mode, PlanMode::Destroy);
    assert_eq!(plan.changes.len(), 1);
    assert_eq!(plan.changes.resources[0].action, ChangeAction::Delete);

    // The snapshots come from the refresh phase, not the destroy walk's
    // reduced working state.
    assert!(plan
        .prior_state
        .resource_instance(&disk("a").instance(InstanceKey::NoKey))
        .is_some());
    assert!(plan
        .prev_run_state
        .resource_instance(&disk("a").instance(InstanceKey::NoKey))
        .is_some());
}

#[tokio::test]
async fn destroy_plan_can_skip_refresh() {
    let ctx = test_context();
    let mut state = State::new();
    state.set_resource_instance(
        disk("a").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 1})),
    );

    let opts = PlanOpts {
        mode: PlanMode::Destroy,
        skip_refresh: true,
        ..PlanOpts::default()
    };
    let (plan, diags) = ctx
        .plan(Some(&one_resource_config()), Some(&state), Some(opts))
        .await;
    assert!(!diags.has_errors());
    assert_eq!(plan.unwrap().changes.resources[0].action, ChangeAction::Delete);
}

struct VanishedProvider;

#[async_trait::async_trait]
impl ResourceProvider for VanishedProvider {
    async fn refresh(
        &self,
        _addr: &crate::addrs::AbsResourceInstance,
        _prior: ResourceInstanceObject,
    ) -> Result<Option<ResourceInstanceObject>, ProviderError> {
        Ok(None)
    }

    fn stop(&self) {}
}

#[tokio::test]
async fn destroy_plan_covers_the_state_as_given_even_when_refresh_drops_objects() {
    let ctx = Context::builder()
        .with_provider("null", Arc::new(VanishedProvider))
        .with_schema_source(Arc::new(StaticSchemaSource::with_providers(&["null"])))
        .build();

    let mut state = State::new();
    state.set_resource_instance(
        disk("a").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 1})),
    );

    let opts = PlanOpts {
        mode: PlanMode::Destroy,
        ..PlanOpts::default()
    };
    let (plan, diags) = ctx
        .plan(Some(&one_resource_config()), Some(&state), Some(opts))
        .await;
    assert!(!diags.has_errors());
    let plan = plan.unwrap();

    // The remote object vanished during the refresh phase, but the
    // destroy walk still runs over the caller's possibly stale state,
    // so everything it records gets a deletion.
    assert_eq!(plan.changes.len(), 1);
    assert_eq!(plan.changes.resources[0].action, ChangeAction::Delete);
    assert_eq!(
        plan.changes.resources[0].addr,
        disk("a").instance(InstanceKey::NoKey)
    );

    // The snapshots still come from the refresh phase: the prior state
    // knows the object is gone, the previous-run state keeps it.
    assert!(plan
        .prior_state
        .resource_instance(&disk("a").instance(InstanceKey::NoKey))
        .is_none());
    assert!(plan
        .prev_run_state
        .resource_instance(&disk("a").instance(InstanceKey::NoKey))
        .is_some());
}

#[tokio::test]
async fn variable_values_round_trip_through_the_plan() {
    let ctx = test_context();
    let mut config = one_resource_config();
    config.module.variables.insert(
        "region".into(),
        VariableDecl {
            default: Some(json!("default-1")),
        },
    );
    config
        .module
        .variables
        .insert("size".into(), VariableDecl { default: None });

    let mut opts = PlanOpts::default();
    opts.set_variables
        .insert("size".into(), InputValue::new(json!({"gb": 16})));

    let (plan, diags) = ctx.plan(Some(&config), None, Some(opts)).await;
    assert!(!diags.has_errors());
    let plan = plan.unwrap();
    assert_eq!(
        plan.variable_values["region"].decode().unwrap(),
        json!("default-1")
    );
    assert_eq!(
        plan.variable_values["size"].decode().unwrap(),
        json!({"gb": 16})
    );
}

#[test]
fn variable_recording_reports_problems_beside_the_plan() {
    let mut variables = InputValues::default();
    variables.insert("region".into(), InputValue::new(json!("west-2")));
    variables.insert("size".into(), InputValue::new(json!({"gb": 16})));

    let mut plan = Plan::default();
    // Diagnostics come back alongside the plan, never instead of it: a
    // value that cannot be serialized only omits itself.
    let diags = super::plan::record_variable_values(&variables, &mut plan);
    assert!(!diags.has_errors());
    assert_eq!(plan.variable_values.len(), 2);
}

#[tokio::test]
async fn missing_required_variable_is_reported_as_a_bug() {
    let ctx = test_context();
    let mut config = one_resource_config();
    config
        .module
        .variables
        .insert("size".into(), VariableDecl { default: None });

    let (plan, diags) = ctx.plan(Some(&config), None, None).await;
    assert!(plan.is_none());
    let diag = diags.errors().next().unwrap();
    assert_eq!(diag.summary, "Unassigned variable");
    assert!(diag.detail.contains("bug"));
}

#[tokio::test]
async fn targeting_warns_and_narrows_the_plan() {
    let ctx = test_context();
    let mut config = one_resource_config();
    config.module.resources.push(disk_config("b", json!({"size": 2})));

    let opts = PlanOpts {
        targets: vec![Targetable::Resource(disk("a"))],
        ..PlanOpts::default()
    };
    let (plan, diags) = ctx.plan(Some(&config), None, Some(opts)).await;
    assert!(!diags.has_errors());
    assert!(diags
        .warnings()
        .any(|d| d.summary == "Resource targeting is in effect"));

    let plan = plan.unwrap();
    assert_eq!(plan.changes.len(), 1);
    assert_eq!(plan.changes.resources[0].addr, disk("a").instance(InstanceKey::NoKey));
    assert_eq!(plan.target_addrs, vec![Targetable::Resource(disk("a"))]);
}

#[tokio::test]
async fn moved_state_plans_as_no_op_at_the_new_address() {
    let ctx = test_context();
    let mut config = Config::empty();
    config.module.resources.push(disk_config("new", json!({"size": 1})));
    config.module.moved.push(MovedBlock {
        from_type: "disk".into(),
        from_name: "old".into(),
        to_type: "disk".into(),
        to_name: "new".into(),
    });

    let mut state = State::new();
    state.set_resource_instance(
        disk("old").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 1})),
    );

    let (plan, diags) = ctx.plan(Some(&config), Some(&state), None).await;
    assert!(!diags.has_errors());
    let plan = plan.unwrap();
    assert_eq!(plan.changes.len(), 1);
    assert_eq!(plan.changes.resources[0].action, ChangeAction::NoOp);
    assert_eq!(
        plan.changes.resources[0].addr,
        disk("new").instance(InstanceKey::NoKey)
    );
    // The previous-run snapshot reflects the rewrite too.
    assert!(plan
        .prev_run_state
        .resource_instance(&disk("new").instance(InstanceKey::NoKey))
        .is_some());
}

#[tokio::test]
async fn move_to_undeclared_resource_fails_the_plan() {
    let ctx = test_context();
    let mut config = one_resource_config();
    config.module.moved.push(MovedBlock {
        from_type: "disk".into(),
        from_name: "old".into(),
        to_type: "disk".into(),
        to_name: "nowhere".into(),
    });

    let (plan, diags) = ctx.plan(Some(&config), None, None).await;
    assert!(plan.is_none());
    assert!(diags
        .errors()
        .any(|d| d.summary == "Moved resource does not exist"));
}

struct SlowProvider {
    current: AtomicUsize,
    max_seen: AtomicUsize,
}

#[async_trait::async_trait]
impl ResourceProvider for Arc<SlowProvider> {
    async fn refresh(
        &self,
        _addr: &crate::addrs::AbsResourceInstance,
        prior: ResourceInstanceObject,
    ) -> Result<Option<ResourceInstanceObject>, ProviderError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(prior))
    }

    fn stop(&self) {}
}

#[tokio::test]
async fn concurrent_plan_calls_serialize_on_the_run_lock() {
    let slow = Arc::new(SlowProvider {
        current: AtomicUsize::new(0),
        max_seen: AtomicUsize::new(0),
    });
    let ctx = Arc::new(
        Context::builder()
            .with_provider("null", Arc::new(Arc::clone(&slow)))
            .with_schema_source(Arc::new(StaticSchemaSource::with_providers(&["null"])))
            .build(),
    );

    let mut state = State::new();
    state.set_resource_instance(
        disk("a").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 1})),
    );

    let mut handles = Vec::new();
    for _ in 0..3 {
        let ctx = Arc::clone(&ctx);
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let (plan, diags) = ctx.plan(Some(&one_resource_config()), Some(&state), None).await;
            assert!(!diags.has_errors());
            assert!(plan.is_some());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(slow.max_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn validate_needs_no_variable_values_or_state() {
    let ctx = test_context();
    let mut config = one_resource_config();
    config
        .module
        .variables
        .insert("size".into(), VariableDecl { default: None });

    let diags = ctx.validate(&config).await;
    assert!(!diags.has_errors());
}

#[tokio::test]
async fn validate_rejects_null_resource_config() {
    let ctx = test_context();
    let mut config = Config::empty();
    config
        .module
        .resources
        .push(disk_config("a", serde_json::Value::Null));

    let diags = ctx.validate(&config).await;
    assert!(diags
        .errors()
        .any(|d| d.summary == "Missing resource configuration"));
}

#[tokio::test]
async fn eval_resolves_variables_outputs_and_state() {
    let ctx = test_context();
    let mut config = Config::empty();
    config.module.variables.insert(
        "region".into(),
        VariableDecl {
            default: Some(json!("west-2")),
        },
    );
    config.module.outputs.push(OutputConfig {
        name: "where".into(),
        expr: "var.region".into(),
    });

    let mut state = State::new();
    state.set_resource_instance(
        disk("a").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 8})),
    );

    let (scope, diags) = ctx.eval(&config, &state, &ModuleInstance::root()).await;
    assert!(!diags.has_errors());
    let scope = scope.unwrap();
    assert_eq!(scope.resolve("var.region"), Some(json!("west-2")));
    assert_eq!(scope.resolve("output.where"), Some(json!("west-2")));
    assert_eq!(scope.resolve("disk.a"), Some(json!({"size": 8})));
    assert_eq!(scope.resolve("disk.missing"), None);
}

#[tokio::test]
async fn eval_returns_no_scope_when_schemas_fail() {
    let ctx = Context::builder()
        .with_schema_source(Arc::new(crate::schemas::FailingSchemaSource))
        .build();
    let (scope, diags) = ctx
        .eval(&Config::empty(), &State::new(), &ModuleInstance::root())
        .await;
    assert!(scope.is_none());
    assert!(diags.has_errors());
}

#[tokio::test]
async fn stop_request_does_not_leak_into_the_next_run() {
    let ctx = test_context();
    ctx.stop();

    let mut state = State::new();
    state.set_resource_instance(
        disk("a").instance(InstanceKey::NoKey),
        ResourceInstanceObject::ready(json!({"size": 1})),
    );
    // The stop above targeted no run in flight; this plan starts with a
    // clear signal and refreshes normally.
    let (plan, diags) = ctx.plan(Some(&one_resource_config()), Some(&state), None).await;
    assert!(!diags.has_errors());
    assert_eq!(plan.unwrap().changes.resources[0].action, ChangeAction::NoOp);
}
