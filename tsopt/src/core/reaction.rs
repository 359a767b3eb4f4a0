//! Reaction instance being searched for a transition state.

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::geometry::Species;

/// Instance names become job-script and result file names.
static INSTANCE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"));

/// One transition-state search attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionInstance {
    /// Unique name of the attempt (`<instance_name>.py` is its job script).
    pub instance_name: String,
    /// Atoms (1-based) defining the reactive motion, in order.
    pub instance: Vec<usize>,
    /// Last step of the constrained procedure; anything beyond means done.
    pub max_step: u32,
    /// Part of an energy scan along a bond-length coordinate.
    #[serde(default)]
    pub scan: bool,
    /// Skip the early scan steps for short instances.
    #[serde(default)]
    pub skip: bool,
    pub species: Species,
}

impl ReactionInstance {
    pub fn validate(&self) -> Result<()> {
        validate_instance_name(&self.instance_name)?;
        self.species.validate()?;
        let natom = self.species.natom();
        if let Some(bad) = self.instance.iter().find(|&&i| i == 0 || i > natom) {
            return Err(anyhow!(
                "instance atom {bad} is outside 1..={natom} for {}",
                self.instance_name
            ));
        }
        Ok(())
    }
}

/// Validate that a name is safe to use as a file stem.
pub fn validate_instance_name(name: &str) -> Result<()> {
    if INSTANCE_NAME_RE.is_match(name) {
        return Ok(());
    }
    Err(anyhow!(
        "instance name must match [A-Za-z0-9][A-Za-z0-9._-]* (got '{name}')"
    ))
}
