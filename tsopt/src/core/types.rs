//! Shared deterministic types for step advancement.
//!
//! These types define stable contracts between the pure transition logic and
//! the I/O adapters. Serialized names are part of the config and result-file
//! formats and must not change.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Job status reported by the quantum-chemistry backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    /// No job has been submitted under this name.
    NotSubmitted,
    /// Job is queued or running.
    Running,
    /// Job finished successfully.
    Normal,
    /// Job finished with an error; its partial output may still be usable.
    Error,
    /// Job was killed by the scheduler.
    Killed,
}

impl QcStatus {
    /// Whether the job has settled into a state whose output can be inspected.
    ///
    /// Only `normal` and `error` let a step proceed; every other status
    /// suspends the step until the next poll.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Normal | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSubmitted => "not_submitted",
            Self::Running => "running",
            Self::Normal => "normal",
            Self::Error => "error",
            Self::Killed => "killed",
        }
    }
}

impl fmt::Display for QcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quantum-chemistry program behind the backend.
///
/// The lowercase name is the backend identity used in template keys
/// (`ase_{program}_ts_search.py.tpl`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QcProgram {
    Gauss,
    Nwchem,
}

impl QcProgram {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauss => "gauss",
            Self::Nwchem => "nwchem",
        }
    }
}

impl fmt::Display for QcProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry-update algorithm used while searching for the saddle point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchAlgorithm {
    /// Apply coordinate changes up front and let the program optimizer run
    /// with the changed coordinates frozen.
    #[default]
    Default,
    /// Hand the raw constraints to the ASE-side PCOBFGS optimizer with a
    /// fixed force-convergence threshold.
    Pcobfgs,
}

/// Job-script template selected for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Constrained search step below `max_step`.
    Search,
    /// Search step rendered for the PCOBFGS optimizer.
    SearchPcobfgs,
    /// Final unconstrained saddle-point optimization.
    End,
}

impl TemplateKind {
    /// File name of the template for the given program.
    pub fn file_name(self, program: QcProgram) -> String {
        match self {
            Self::Search => format!("ase_{program}_ts_search.py.tpl"),
            Self::SearchPcobfgs => format!("ase_{program}_ts_search_pcobfgs.py.tpl"),
            Self::End => format!("ase_{program}_ts_end.py.tpl"),
        }
    }

    /// Whether the template runs the program itself and therefore needs the
    /// execution command and working directory.
    pub fn is_search(self) -> bool {
        !matches!(self, Self::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_normal_and_error_are_settled() {
        assert!(QcStatus::Normal.is_settled());
        assert!(QcStatus::Error.is_settled());
        assert!(!QcStatus::Running.is_settled());
        assert!(!QcStatus::Killed.is_settled());
        assert!(!QcStatus::NotSubmitted.is_settled());
    }

    #[test]
    fn template_file_names_follow_program_identity() {
        assert_eq!(
            TemplateKind::Search.file_name(QcProgram::Gauss),
            "ase_gauss_ts_search.py.tpl"
        );
        assert_eq!(
            TemplateKind::SearchPcobfgs.file_name(QcProgram::Nwchem),
            "ase_nwchem_ts_search_pcobfgs.py.tpl"
        );
        assert_eq!(
            TemplateKind::End.file_name(QcProgram::Gauss),
            "ase_gauss_ts_end.py.tpl"
        );
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&QcStatus::NotSubmitted).expect("serialize");
        assert_eq!(json, "\"not_submitted\"");
        let parsed: QcStatus = serde_json::from_str("\"normal\"").expect("parse");
        assert_eq!(parsed, QcStatus::Normal);
    }
}
