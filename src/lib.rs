//! # Stategraph: Graph-driven Resource Orchestration Engine
//!
//! Stategraph plans and evaluates declarative resource configurations by
//! building operation-specific dependency graphs and walking them
//! concurrently over synchronized state views.
//!
//! ## Core Concepts
//!
//! - **Context**: The long-lived entry point carrying providers, schemas,
//!   and the single-run lock
//! - **Graph**: Nodes plus dependency edges, assembled per operation by a
//!   builder and executed as concurrently as the edges allow
//! - **State views**: Independent deep copies (previous-run, refresh,
//!   working) wrapped for serialized concurrent access
//! - **Changes**: The accumulator of proposed per-instance actions that
//!   becomes the plan
//! - **Diagnostics**: Severity-tagged problem reports collected across a
//!   whole operation instead of failing at the first error
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use stategraph::config::{Config, ExpansionDecl, ResourceConfig};
//! use stategraph::context::Context;
//! use stategraph::plan::ChangeAction;
//! use stategraph::provider::NoopProvider;
//! use stategraph::schemas::StaticSchemaSource;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut config = Config::empty();
//! config.module.resources.push(ResourceConfig {
//!     type_name: "disk".into(),
//!     name: "primary".into(),
//!     provider: "null".into(),
//!     expansion: ExpansionDecl::Single,
//!     config: json!({"size": 8}),
//! });
//!
//! let ctx = Context::builder()
//!     .with_provider("null", Arc::new(NoopProvider))
//!     .with_schema_source(Arc::new(StaticSchemaSource::with_providers(&["null"])))
//!     .build();
//!
//! let (plan, diags) = ctx.plan(Some(&config), None, None).await;
//! assert!(!diags.has_errors());
//! let plan = plan.unwrap();
//! assert_eq!(plan.changes.resources[0].action, ChangeAction::Create);
//! # }
//! ```
//!
//! ## Planning Modes
//!
//! [`context::Context::plan`] dispatches on [`plan::PlanMode`]:
//!
//! - `Normal` diffs configuration against refreshed state
//! - `RefreshOnly` updates state from real infrastructure and must
//!   propose no changes at all
//! - `Destroy` refreshes first (unless skipped), then plans the deletion
//!   of everything in state
//!
//! Validation and expression evaluation have their own entry points,
//! [`context::Context::validate`] and [`context::Context::eval`], walking
//! reduced graphs over empty or caller-supplied state.

pub mod addrs;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod eval;
pub mod graph;
pub mod instances;
pub mod plan;
pub mod provider;
pub mod refactoring;
pub mod schemas;
pub mod state;
pub mod telemetry;
pub mod vars;
pub mod version;
