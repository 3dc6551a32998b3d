//! Schema resolution: the external collaborator consulted before any
//! graph is built.
//!
//! The engine never defines provider schemas itself; it asks a
//! [`SchemaSource`] for the resolved set, synchronously, before building
//! a graph. A failure here is the only case in which `Context::eval`
//! returns no scope at all.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::config::Config;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::state::State;

/// Resolved schema for one provider.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProviderSchema {
    /// Schema body per resource type name. The engine treats bodies as
    /// opaque; they exist for nodes and providers to consult.
    pub resource_types: FxHashMap<String, Value>,
}

/// The full set of schemas resolved for one operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schemas {
    pub providers: FxHashMap<String, ProviderSchema>,
}

impl Schemas {
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&ProviderSchema> {
        self.providers.get(name)
    }
}

/// Capability for resolving provider schemas from configuration and,
/// optionally, previous state.
pub trait SchemaSource: Send + Sync {
    /// Resolve schemas for the given configuration. `state` is the
    /// previous run state when one is available; sources may use it to
    /// discover providers only referenced by state.
    fn schemas(&self, config: &Config, state: Option<&State>) -> Result<Schemas, Diagnostics>;
}

/// A schema source backed by a fixed schema set, for embedders that
/// resolve schemas ahead of time and for tests.
#[derive(Clone, Debug, Default)]
pub struct StaticSchemaSource {
    schemas: Schemas,
}

impl StaticSchemaSource {
    #[must_use]
    pub fn new(schemas: Schemas) -> Self {
        Self { schemas }
    }

    /// A source that knows the named providers with empty schemas.
    #[must_use]
    pub fn with_providers(names: &[&str]) -> Self {
        let mut schemas = Schemas::default();
        for name in names {
            schemas
                .providers
                .insert((*name).to_string(), ProviderSchema::default());
        }
        Self { schemas }
    }
}

impl SchemaSource for StaticSchemaSource {
    fn schemas(&self, _config: &Config, _state: Option<&State>) -> Result<Schemas, Diagnostics> {
        Ok(self.schemas.clone())
    }
}

/// A schema source that always fails, for exercising the failure path.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingSchemaSource;

impl SchemaSource for FailingSchemaSource {
    fn schemas(&self, _config: &Config, _state: Option<&State>) -> Result<Schemas, Diagnostics> {
        Err(Diagnostic::error(
            "Failed to resolve provider schemas",
            "The schema source reported an unconditional failure.",
        )
        .into())
    }
}
