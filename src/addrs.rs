//! Address types for the stategraph orchestration engine.
//!
//! Everything the engine plans or evaluates is identified by an address:
//! a module instance path, a resource within a module, or one concrete
//! instance of a resource after `count`/`for_each` expansion. Addresses
//! are plain value types; they hash, order, and render deterministically
//! so they can key synchronized maps and appear verbatim in diagnostics.
//!
//! # Key Types
//!
//! - [`ModuleInstance`]: a path of named module steps, rooted at `root()`
//! - [`AbsResource`]: a resource (type + name) within one module instance
//! - [`AbsResourceInstance`]: an expanded instance of a resource
//! - [`Targetable`]: caller-supplied narrowing targets for a plan
//! - [`UniqueKey`]: stable string key derived from an address
//!
//! # Examples
//!
//! ```
//! use stategraph::addrs::{AbsResource, InstanceKey, ModuleInstance};
//!
//! let res = AbsResource::new(ModuleInstance::root(), "disk", "primary");
//! let inst = res.instance(InstanceKey::Int(0));
//! assert_eq!(inst.to_string(), "disk.primary[0]");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A path identifying one instance of a module within the configuration
/// tree. The empty path is the root module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleInstance(Vec<String>);

impl ModuleInstance {
    /// The root module instance: the top of the configuration tree.
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns `true` if this is the root module instance.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the address of a child module call beneath this instance.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut steps = self.0.clone();
        steps.push(name.into());
        Self(steps)
    }

    /// The named steps of this path, outermost first.
    pub fn steps(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        let mut first = true;
        for step in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "module.{step}")?;
            first = false;
        }
        Ok(())
    }
}

/// A resource declared within one module instance, before instance
/// expansion. Two resources are the same iff module, type, and name all
/// match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AbsResource {
    pub module: ModuleInstance,
    pub type_name: String,
    pub name: String,
}

impl AbsResource {
    pub fn new(
        module: ModuleInstance,
        type_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            module,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// The address of one expanded instance of this resource.
    #[must_use]
    pub fn instance(&self, key: InstanceKey) -> AbsResourceInstance {
        AbsResourceInstance {
            resource: self.clone(),
            key,
        }
    }
}

impl fmt::Display for AbsResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module.is_root() {
            write!(f, "{}.", self.module)?;
        }
        write!(f, "{}.{}", self.type_name, self.name)
    }
}

/// The key distinguishing one instance of an expanded resource.
///
/// `NoKey` is the single instance of an unexpanded resource; `Int` keys
/// come from `count`, `Str` keys from `for_each`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstanceKey {
    NoKey,
    Int(u64),
    Str(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::NoKey => Ok(()),
            InstanceKey::Int(n) => write!(f, "[{n}]"),
            InstanceKey::Str(s) => write!(f, "[{s:?}]"),
        }
    }
}

/// The address of one concrete resource instance: the unit of state
/// tracking and of planned change entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AbsResourceInstance {
    pub resource: AbsResource,
    pub key: InstanceKey,
}

impl AbsResourceInstance {
    /// Stable unique key for this address, usable as a map key that
    /// survives serialization.
    #[must_use]
    pub fn unique_key(&self) -> UniqueKey {
        UniqueKey(self.to_string())
    }
}

impl fmt::Display for AbsResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.resource, self.key)
    }
}

/// A stable, order-preserving key derived from an address's canonical
/// string form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueKey(String);

impl UniqueKey {
    pub fn of(addr: &impl fmt::Display) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A caller-supplied target narrowing a plan to a subset of resources.
///
/// Targeting is not for routine use; `Context::plan` warns whenever any
/// targets are in effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Targetable {
    Module(ModuleInstance),
    Resource(AbsResource),
    ResourceInstance(AbsResourceInstance),
}

impl Targetable {
    /// Whether this target covers the given resource instance.
    ///
    /// A module target covers everything beneath it; a resource target
    /// covers all of its instances; an instance target covers exactly
    /// itself.
    #[must_use]
    pub fn contains(&self, inst: &AbsResourceInstance) -> bool {
        match self {
            Targetable::Module(module) => {
                let steps = inst.resource.module.steps();
                steps.len() >= module.steps().len() && steps.starts_with(module.steps())
            }
            Targetable::Resource(res) => *res == inst.resource,
            Targetable::ResourceInstance(target) => target == inst,
        }
    }
}

impl fmt::Display for Targetable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Targetable::Module(m) => write!(f, "{m}"),
            Targetable::Resource(r) => write!(f, "{r}"),
            Targetable::ResourceInstance(i) => write!(f, "{i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_instance_display() {
        assert_eq!(ModuleInstance::root().to_string(), "<root>");
        assert_eq!(
            ModuleInstance::root().child("net").child("subnet").to_string(),
            "module.net.module.subnet"
        );
    }

    #[test]
    fn resource_instance_display() {
        let res = AbsResource::new(ModuleInstance::root(), "disk", "primary");
        assert_eq!(res.instance(InstanceKey::NoKey).to_string(), "disk.primary");
        assert_eq!(res.instance(InstanceKey::Int(2)).to_string(), "disk.primary[2]");
        assert_eq!(
            res.instance(InstanceKey::Str("a".into())).to_string(),
            "disk.primary[\"a\"]"
        );

        let nested = AbsResource::new(ModuleInstance::root().child("net"), "vpc", "main");
        assert_eq!(
            nested.instance(InstanceKey::NoKey).to_string(),
            "module.net.vpc.main"
        );
    }

    #[test]
    fn targetable_contains() {
        let child = ModuleInstance::root().child("net");
        let res = AbsResource::new(child.clone(), "vpc", "main");
        let inst = res.instance(InstanceKey::Int(0));

        assert!(Targetable::Module(ModuleInstance::root()).contains(&inst));
        assert!(Targetable::Module(child).contains(&inst));
        assert!(!Targetable::Module(ModuleInstance::root().child("other")).contains(&inst));
        assert!(Targetable::Resource(res.clone()).contains(&inst));
        assert!(Targetable::ResourceInstance(inst.clone()).contains(&inst));
        assert!(!Targetable::ResourceInstance(res.instance(InstanceKey::Int(1))).contains(&inst));
    }

    #[test]
    fn unique_key_is_stable() {
        let res = AbsResource::new(ModuleInstance::root(), "disk", "primary");
        let a = res.instance(InstanceKey::Int(1)).unique_key();
        let b = res.instance(InstanceKey::Int(1)).unique_key();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "disk.primary[1]");
    }
}
