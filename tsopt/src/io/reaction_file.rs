//! Reaction input files.
//!
//! ```toml
//! [reaction]
//! instance_name = "rxn001"
//! instance = [1, 2, 3]
//! max_step = 14
//!
//! [reaction.species]
//! chemid = "c2h4o"
//! atom = ["C", "C", "O", "H", "H"]
//! geom = [[0.0, 0.0, 0.0], ...]
//!
//! [[constraints]]
//! step = 0
//! fix = [[1, 2]]
//! change = [[2, 3, 1.4]]
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::reaction::ReactionInstance;
use crate::io::solver::{PlannedConstraints, PlannedStep};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionFile {
    pub reaction: ReactionInstance,
    /// Per-step constraint plan (1-based indices).
    #[serde(default)]
    pub constraints: Vec<PlannedStep>,
}

/// A validated reaction and the solver replaying its plan.
#[derive(Debug, Clone)]
pub struct LoadedReaction {
    pub reaction: ReactionInstance,
    pub solver: PlannedConstraints,
}

pub fn load_reaction(path: &Path) -> Result<LoadedReaction> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read reaction {}", path.display()))?;
    let file: ReactionFile =
        toml::from_str(&contents).with_context(|| format!("parse reaction {}", path.display()))?;
    let ReactionFile {
        mut reaction,
        constraints,
    } = file;
    reaction
        .validate()
        .with_context(|| format!("invalid reaction {}", path.display()))?;
    reaction.species.ensure_bonds();
    let solver = PlannedConstraints::new(reaction.max_step, constraints)
        .with_context(|| format!("invalid constraint plan in {}", path.display()))?;
    debug!(
        instance = %reaction.instance_name,
        natom = reaction.species.natom(),
        max_step = reaction.max_step,
        "reaction loaded"
    );
    Ok(LoadedReaction { reaction, solver })
}
