//! Plan results: modes, options, and the externally consumed [`Plan`].
//!
//! A `Plan` is the output of a plan-mode walk: the proposed resource
//! changes, the prior and previous-run state snapshots, and enough
//! run-level bookkeeping (variables, targets, provider fingerprints) for
//! a later apply step to reconstruct the run exactly.

pub mod changes;

pub use changes::{ChangeAction, Changes, ResourceChange, SyncChanges};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::addrs::{AbsResourceInstance, Targetable};
use crate::state::State;
use crate::vars::InputValues;

/// The caller-selectable planning modes.
///
/// Validate and eval walks exist internally but are not plan modes a
/// caller can request through `Context::plan`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanMode {
    /// Plan changes to converge real infrastructure on the configuration.
    #[default]
    Normal,
    /// Plan the destruction of everything currently in state.
    Destroy,
    /// Refresh state from real infrastructure without planning any change.
    RefreshOnly,
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanMode::Normal => write!(f, "normal"),
            PlanMode::Destroy => write!(f, "destroy"),
            PlanMode::RefreshOnly => write!(f, "refresh-only"),
        }
    }
}

/// Options shaping one planning operation.
#[derive(Clone, Debug, Default)]
pub struct PlanOpts {
    pub mode: PlanMode,
    /// Skip refreshing state from real infrastructure before diffing.
    /// Incompatible with [`PlanMode::RefreshOnly`].
    pub skip_refresh: bool,
    /// Caller-supplied root variable values, merged over declared defaults.
    pub set_variables: InputValues,
    /// Narrow the plan to these targets. Non-routine; produces a warning.
    pub targets: Vec<Targetable>,
    /// Force replacement of these instances. Only valid in normal mode.
    pub force_replace: Vec<AbsResourceInstance>,
}

/// A value serialized together with its dynamic type so it can be
/// reconstructed exactly when the plan is consumed later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicValue {
    raw: Vec<u8>,
    type_tag: String,
}

fn type_tag_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl DynamicValue {
    /// Serialize a value along with its dynamic type.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self {
            raw: serde_json::to_vec(value)?,
            type_tag: type_tag_of(value).to_string(),
        })
    }

    /// Reconstruct the original value. Fails if the stored bytes do not
    /// decode to a value of the recorded dynamic type.
    pub fn decode(&self) -> Result<Value, serde_json::Error> {
        use serde::de::Error as _;
        let value: Value = serde_json::from_slice(&self.raw)?;
        if type_tag_of(&value) != self.type_tag {
            return Err(serde_json::Error::custom(format!(
                "stored value decoded as {} but was recorded as {}",
                type_tag_of(&value),
                self.type_tag,
            )));
        }
        Ok(value)
    }
}

/// The externally consumed result of one plan-mode walk.
///
/// Constructed empty by the plan walk, completed field by field by the
/// mode-specific planning function and then by the top-level `plan` entry
/// point; immutable once returned to the caller.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub mode: PlanMode,
    pub changes: Changes,
    /// State after refresh; the baseline the changes were diffed against.
    pub prior_state: State,
    /// State exactly as it was before this operation began.
    pub prev_run_state: State,
    /// Root variable values, serialized for exact round-trip.
    pub variable_values: FxHashMap<String, DynamicValue>,
    pub target_addrs: Vec<Targetable>,
    /// Content fingerprints of the providers consulted during planning.
    pub provider_fingerprints: FxHashMap<String, String>,
}
