//! The provider instance capability exposed to graph nodes.
//!
//! Providers implement resource CRUD against real infrastructure; the
//! engine only sees them through this narrow trait. Nodes may invoke a
//! provider during execution and must relay the walk's cooperative stop
//! signal: [`ResourceProvider::stop`] asks the provider to halt any
//! long-running external operation, and the framework never force-kills
//! node execution.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::addrs::AbsResourceInstance;
use crate::state::ResourceInstanceObject;

/// Errors reported by provider invocations.
#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    /// The provider could not read the remote object.
    #[error("provider {provider} failed to read {addr}: {message}")]
    #[diagnostic(code(stategraph::provider::read))]
    Read {
        provider: String,
        addr: String,
        message: String,
    },

    /// The provider was asked for a resource type it does not implement.
    #[error("provider {provider} does not support resource type {type_name}")]
    #[diagnostic(
        code(stategraph::provider::unsupported_type),
        help("Check the provider name declared for this resource.")
    )]
    UnsupportedType { provider: String, type_name: String },
}

/// Capability for reading one resource instance from real infrastructure.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Refresh the stored object for `addr` against real infrastructure.
    /// Returning `None` means the remote object no longer exists.
    async fn refresh(
        &self,
        addr: &AbsResourceInstance,
        prior: ResourceInstanceObject,
    ) -> Result<Option<ResourceInstanceObject>, ProviderError>;

    /// Cooperatively request that any in-flight external operation halt.
    /// Called by the walk's stop watcher; implementations must not block.
    fn stop(&self);
}

/// A provider that reports every object unchanged and never talks to any
/// external system. The default when an embedder registers none.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProvider;

#[async_trait]
impl ResourceProvider for NoopProvider {
    async fn refresh(
        &self,
        _addr: &AbsResourceInstance,
        prior: ResourceInstanceObject,
    ) -> Result<Option<ResourceInstanceObject>, ProviderError> {
        Ok(Some(prior))
    }

    fn stop(&self) {}
}

/// The static provider bindings a context carries across calls.
#[derive(Clone, Default)]
pub struct Components {
    providers: FxHashMap<String, Arc<dyn ResourceProvider>>,
}

impl Components {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, name: impl Into<String>, provider: Arc<dyn ResourceProvider>) {
        self.providers.insert(name.into(), provider);
    }

    #[must_use]
    pub fn provider(&self, name: &str) -> Option<Arc<dyn ResourceProvider>> {
        self.providers.get(name).cloned()
    }

    /// All registered providers, for stop broadcasting.
    pub fn all_providers(&self) -> impl Iterator<Item = &Arc<dyn ResourceProvider>> {
        self.providers.values()
    }
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
