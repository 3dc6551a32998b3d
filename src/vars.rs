//! Input variable values: merging caller-supplied values with declared
//! defaults, and checking completeness before a walk begins.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::VariableDecl;
use crate::diagnostics::{Diagnostic, Diagnostics};

/// One resolved input variable value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputValue {
    pub value: Value,
}

impl InputValue {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

/// Resolved values for a module's input variables, keyed by name.
pub type InputValues = FxHashMap<String, InputValue>;

/// Merge caller-supplied variable values over module-declared defaults.
///
/// Caller values always win; declared defaults fill the gaps. Declared
/// variables with neither a caller value nor a default are left absent,
/// to be reported by [`check_input_variables`].
pub fn merge_default_input_variable_values(
    set: InputValues,
    decls: &FxHashMap<String, VariableDecl>,
) -> InputValues {
    let mut merged = set;
    for (name, decl) in decls {
        if merged.contains_key(name) {
            continue;
        }
        if let Some(default) = &decl.default {
            merged.insert(name.clone(), InputValue::new(default.clone()));
        }
    }
    merged
}

/// Check that every declared variable has a value after merging.
///
/// By the time planning gets here the calling layer should already have
/// collected and validated all variable values, so a failure here is a
/// defect in the caller rather than something the end user did wrong.
pub fn check_input_variables(
    decls: &FxHashMap<String, VariableDecl>,
    values: &InputValues,
) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let mut missing: Vec<&String> = decls
        .iter()
        .filter(|(name, _)| !values.contains_key(name.as_str()))
        .map(|(name, _)| name)
        .collect();
    missing.sort();
    for name in missing {
        diags.append(Diagnostic::bug(
            "Unassigned variable",
            format!("The input variable {name:?} has not been assigned a value."),
        ));
    }
    diags
}
