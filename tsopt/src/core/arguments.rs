//! Program-specific calculator arguments for job scripts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::constraints::{Change, Coordinate};
use crate::core::types::QcProgram;

/// Level of theory and resources for the calculator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelOfTheory {
    /// Method used for the final saddle-point optimization.
    pub method: String,
    pub basis: String,
    /// Cheaper method used for the constrained search steps.
    pub scan_method: String,
    pub scan_basis: String,
    /// Memory string passed to the program (e.g. `"1000MW"`).
    pub mem: String,
}

impl Default for LevelOfTheory {
    fn default() -> Self {
        Self {
            method: "b3lyp".to_string(),
            basis: "6-31G".to_string(),
            scan_method: "am1".to_string(),
            scan_basis: String::new(),
            mem: "1000MW".to_string(),
        }
    }
}

/// Inputs to argument construction for one job.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentRequest<'a> {
    pub name: &'a str,
    pub mult: u32,
    pub charge: i32,
    /// Transition-state search (as opposed to a minimum).
    pub ts: bool,
    pub step: u32,
    pub max_step: u32,
    pub scan: bool,
}

/// Keyword arguments for the ASE calculator, kept sorted for stable output.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct QcArguments(BTreeMap<String, Value>);

impl QcArguments {
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Merge the step's constraint lists under `fix`, `change` and `release`.
    pub fn merge_constraints(&mut self, fix: &[Coordinate], change: &[Change], release: &[Coordinate]) {
        self.insert("fix", to_value(fix));
        self.insert("change", to_value(change));
        self.insert("release", to_value(release));
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

fn to_value<T: Serialize>(items: &[T]) -> Value {
    // Constraint types serialize to plain number lists, which cannot fail.
    serde_json::to_value(items).unwrap_or(Value::Null)
}

/// Build calculator arguments for a program.
pub fn build_arguments(
    program: QcProgram,
    ppn: u32,
    level: &LevelOfTheory,
    request: &ArgumentRequest<'_>,
) -> QcArguments {
    match program {
        QcProgram::Gauss => gaussian_arguments(ppn, level, request),
        QcProgram::Nwchem => nwchem_arguments(level, request),
    }
}

fn gaussian_arguments(ppn: u32, level: &LevelOfTheory, request: &ArgumentRequest<'_>) -> QcArguments {
    let mut args = QcArguments::default();
    args.insert("method", level.method.as_str());
    args.insert("basis", level.basis.as_str());
    args.insert("nprocshared", ppn);
    args.insert("mem", level.mem.as_str());
    args.insert("chk", request.name);
    args.insert("label", request.name);
    args.insert("NoSymm", "NoSymm");
    args.insert("multiplicity", request.mult);
    args.insert("charge", request.charge);
    args.insert("scf", "xqc");

    if request.ts {
        if request.step < request.max_step {
            args.insert("method", level.scan_method.as_str());
            args.insert("basis", level.scan_basis.as_str());
            if request.scan {
                args.insert("opt", "ModRedun,Tight,MaxCycle=999");
            } else {
                args.insert("opt", "ModRedun,Tight,CalcFC,MaxCycle=999");
            }
        } else {
            args.insert("opt", "NoFreeze,TS,CalcFC,NoEigentest,MaxCycle=999");
            args.insert("freq", "freq");
        }
    }
    args
}

fn nwchem_arguments(level: &LevelOfTheory, request: &ArgumentRequest<'_>) -> QcArguments {
    let mut args = QcArguments::default();
    args.insert("xc", level.method.as_str());
    args.insert("basis", level.basis.as_str());
    args.insert("label", request.name);
    args.insert("mult", request.mult);
    args.insert("charge", request.charge);

    if request.ts && request.step < request.max_step {
        args.insert("xc", level.scan_method.as_str());
        if !level.scan_basis.is_empty() {
            args.insert("basis", level.scan_basis.as_str());
        }
        args.insert("task", "optimize");
        args.insert("opt", "maxiter 999");
    } else if request.ts {
        args.insert("task", "saddle");
        args.insert("opt", "maxiter 999; tight");
    } else {
        args.insert("task", "optimize");
        args.insert("opt", "maxiter 999");
    }
    args
}
