//! The long-lived engine context and its entry points.
//!
//! A [`Context`] carries everything that survives across operations: the
//! registered providers, the schema source, provider fingerprints, the
//! single-run lock, and the cooperative stop channel. The operations
//! themselves live in sibling modules: [`Context::plan`],
//! [`Context::validate`], and [`Context::eval`].
//!
//! # Examples
//!
//! ```
//! use stategraph::context::Context;
//! use stategraph::config::Config;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ctx = Context::builder().build();
//! let diags = ctx.validate(&Config::empty()).await;
//! assert!(!diags.has_errors());
//! # }
//! ```

mod eval;
mod plan;
mod validate;
mod walk;

#[cfg(test)]
mod tests;

pub(crate) use walk::GraphWalkOpts;

use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::provider::{Components, ResourceProvider};
use crate::schemas::{SchemaSource, StaticSchemaSource};

/// The engine's long-lived execution context.
///
/// One context runs at most one operation at a time; concurrent callers
/// queue on the internal run lock.
pub struct Context {
    components: Components,
    schema_source: Arc<dyn SchemaSource>,
    provider_fingerprints: FxHashMap<String, String>,
    run_lock: Mutex<()>,
    stop_tx: watch::Sender<bool>,
}

impl Context {
    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// The provider bindings this context was built with.
    #[must_use]
    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Request a cooperative stop of whatever operation is in flight.
    /// Node execution is never killed; nodes observe the signal before
    /// starting external calls, and the stop watcher relays it to every
    /// registered provider.
    pub fn stop(&self) {
        debug!("stop requested");
        self.stop_tx.send_replace(true);
    }

    /// Take the run lock for one named operation.
    pub(crate) async fn acquire_run(&self, activity: &str) -> MutexGuard<'_, ()> {
        debug!(activity, "acquiring run lock");
        let guard = self.run_lock.lock().await;
        // Each run starts with a clear stop signal; a stop only affects
        // the operation in flight when it was requested.
        self.stop_tx.send_replace(false);
        guard
    }

    pub(crate) fn stop_receiver(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// Spawn the stop watcher for one walk. When the stop signal fires it
    /// relays the request to every registered provider; the returned
    /// sender shuts the watcher down once the walk has finished.
    pub(crate) fn watch_stop(&self) -> (oneshot::Sender<()>, JoinHandle<()>) {
        let (done_tx, mut done_rx) = oneshot::channel::<()>();
        let components = self.components.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        let watcher = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut done_rx => break,
                    changed = stop_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *stop_rx.borrow() {
                            debug!("relaying stop request to providers");
                            for provider in components.all_providers() {
                                provider.stop();
                            }
                        }
                    }
                }
            }
        });
        (done_tx, watcher)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("components", &self.components)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Context`].
pub struct ContextBuilder {
    components: Components,
    schema_source: Arc<dyn SchemaSource>,
    provider_fingerprints: FxHashMap<String, String>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            components: Components::new(),
            schema_source: Arc::new(StaticSchemaSource::default()),
            provider_fingerprints: FxHashMap::default(),
        }
    }
}

impl ContextBuilder {
    /// Register a provider under the given name.
    #[must_use]
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn ResourceProvider>) -> Self {
        self.components.register_provider(name, provider);
        self
    }

    /// Use the given schema source instead of the default empty one.
    #[must_use]
    pub fn with_schema_source(mut self, source: Arc<dyn SchemaSource>) -> Self {
        self.schema_source = source;
        self
    }

    /// Record a content fingerprint for a provider, copied into every
    /// plan this context produces.
    #[must_use]
    pub fn with_provider_fingerprint(
        mut self,
        name: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        self.provider_fingerprints.insert(name.into(), fingerprint.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Context {
        let (stop_tx, _) = watch::channel(false);
        Context {
            components: self.components,
            schema_source: self.schema_source,
            provider_fingerprints: self.provider_fingerprints,
            run_lock: Mutex::new(()),
            stop_tx,
        }
    }
}
