//! The immutable configuration tree consumed by the engine.
//!
//! Configuration arrives already parsed and syntactically validated by an
//! external loader; this module only defines the shape the engine reads.
//! A [`Config`] is one module plus its children, addressed by module path.
//! Nothing in the engine ever mutates a `Config`.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::addrs::ModuleInstance;
use crate::version::CoreVersion;

/// Declaration of an input variable within a module.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    /// Default value used when the caller supplies none. Variables with no
    /// default must be set by the caller before planning.
    pub default: Option<Value>,
}

/// Declared instance expansion for a resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ExpansionDecl {
    /// No `count` or `for_each`: exactly one keyless instance.
    #[default]
    Single,
    /// `count = n`: instances keyed `[0] .. [n-1]`.
    Count(u64),
    /// `for_each`: one instance per string key.
    ForEach(Vec<String>),
}

/// A managed resource declared in configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub type_name: String,
    pub name: String,
    /// Name of the provider responsible for this resource's type.
    pub provider: String,
    pub expansion: ExpansionDecl,
    /// The desired configuration body, as evaluated by the loader.
    pub config: Value,
}

/// An output value declared in configuration. The expression is an opaque
/// reference string resolved through an evaluation scope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    pub expr: String,
}

/// A `moved` block: the state for `from` should be treated as having moved
/// to `to` without destroying and recreating anything. Both sides are
/// resource names local to the declaring module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedBlock {
    pub from_type: String,
    pub from_name: String,
    pub to_type: String,
    pub to_name: String,
}

/// The body of one module: its declarations, without children.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub variables: FxHashMap<String, VariableDecl>,
    pub resources: Vec<ResourceConfig>,
    pub outputs: Vec<OutputConfig>,
    pub moved: Vec<MovedBlock>,
}

/// One node of the configuration tree: a module and its child module calls.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub module: Module,
    pub children: FxHashMap<String, Config>,
    /// Minimum engine version this module requires, if constrained.
    pub required_core_version: Option<CoreVersion>,
}

impl Config {
    /// An empty configuration, used to normalize degenerate callers that
    /// pass no config at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The child config at the given name, if declared.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Config> {
        self.children.get(name)
    }

    /// Visit every module in the tree, outermost first, with its
    /// module-instance address.
    pub fn visit_modules<'a>(&'a self, mut f: impl FnMut(&ModuleInstance, &'a Module)) {
        fn walk<'a>(
            cfg: &'a Config,
            path: &ModuleInstance,
            f: &mut impl FnMut(&ModuleInstance, &'a Module),
        ) {
            f(path, &cfg.module);
            for (name, child) in &cfg.children {
                walk(child, &path.child(name.clone()), f);
            }
        }
        walk(self, &ModuleInstance::root(), &mut f);
    }
}
