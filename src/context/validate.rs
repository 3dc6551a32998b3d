//! Configuration validation without touching state or infrastructure.

use serde_json::Value;
use tracing::instrument;

use super::{Context, GraphWalkOpts};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::graph::{validate_graph_builder, GraphBuild, WalkOperation};
use crate::vars::{InputValue, InputValues};
use crate::version::check_core_version_requirements;

impl Context {
    /// Validate `config` in isolation: no state is read, no provider is
    /// invoked, and no caller-supplied variable values are required.
    #[instrument(skip_all)]
    pub async fn validate(&self, config: &Config) -> Diagnostics {
        let _run = self.acquire_run("validate").await;

        let mut diags = check_core_version_requirements(config);
        if diags.has_errors() {
            return diags;
        }

        let schemas = match self.schema_source.schemas(config, None) {
            Ok(schemas) => schemas,
            Err(schema_diags) => {
                diags.extend(schema_diags);
                return diags;
            }
        };

        let (graph, build_diags) = validate_graph_builder(config, &schemas).build();
        diags.extend(build_diags);
        if diags.has_errors() {
            return diags;
        }

        // Every declared variable gets a stand-in value so validation
        // never depends on what the caller would supply at plan time.
        let mut variables = InputValues::default();
        for (name, decl) in &config.module.variables {
            let value = decl.default.clone().unwrap_or(Value::Null);
            variables.insert(name.clone(), InputValue::new(value));
        }

        let opts = GraphWalkOpts {
            root_variable_values: variables,
            ..GraphWalkOpts::default()
        };
        let (walker, walk_diags) = self.walk(&graph, WalkOperation::Validate, opts).await;
        diags.extend(walker.take_non_fatal());
        diags.extend(walk_diags);
        diags
    }
}
