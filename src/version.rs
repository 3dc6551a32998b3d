//! Engine version requirement checking.
//!
//! Modules may constrain the minimum engine version they support. Both
//! `Context::validate` and `Context::plan` run this check before resolving
//! schemas or building any graph, and bail out immediately on failure:
//! proceeding would just bury the real problem under cascading errors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Config;
use crate::diagnostics::{Diagnostic, Diagnostics};

/// A semantic version triple, ordered lexicographically by component.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CoreVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl CoreVersion {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for CoreVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The version of this engine, against which module requirements are
/// checked.
pub const CORE_VERSION: CoreVersion = CoreVersion::new(0, 1, 0);

/// Check every module's declared minimum engine version against
/// [`CORE_VERSION`], returning one error diagnostic per unsatisfied
/// module.
pub fn check_core_version_requirements(config: &Config) -> Diagnostics {
    let mut diags = Diagnostics::new();
    config.visit_modules(|path, _| {
        // Requirements live on the Config node, so resolve it back from
        // the path rather than the module body.
        let mut cfg = config;
        for step in path.steps() {
            match cfg.child(step) {
                Some(child) => cfg = child,
                None => return,
            }
        }
        if let Some(required) = cfg.required_core_version {
            if required > CORE_VERSION {
                diags.append(Diagnostic::error(
                    "Unsupported engine version",
                    format!(
                        "Module {path} requires engine version {required} or later, \
                         but this is version {CORE_VERSION}."
                    ),
                ));
            }
        }
    });
    diags
}
