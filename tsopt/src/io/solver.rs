//! Constraint solver abstraction and the plan-driven implementation.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::constraints::{Change, ConstraintSet, Coordinate, StepConstraints};
use crate::core::geometry::Geometry;

/// Produces the fix/change/release lists for a step.
///
/// Indices in the returned set are 1-based. The solver may return a later
/// step than requested to skip steps that have nothing to do.
pub trait ConstraintSolver {
    fn get_constraints(&self, step: u32, geom: &Geometry) -> Result<StepConstraints>;
}

/// One entry of a constraint plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub step: u32,
    #[serde(default)]
    pub fix: Vec<Coordinate>,
    #[serde(default)]
    pub change: Vec<Change>,
    #[serde(default)]
    pub release: Vec<Coordinate>,
}

/// Solver that replays a fixed per-step plan.
///
/// Steps missing from the plan are skipped; once the plan is exhausted the
/// solver answers `max_step + 1`.
#[derive(Debug, Clone)]
pub struct PlannedConstraints {
    max_step: u32,
    steps: Vec<PlannedStep>,
}

impl PlannedConstraints {
    pub fn new(max_step: u32, mut steps: Vec<PlannedStep>) -> Result<Self> {
        steps.sort_by_key(|s| s.step);
        if let Some(pair) = steps.windows(2).find(|w| w[0].step == w[1].step) {
            return Err(anyhow!("constraint plan lists step {} twice", pair[0].step));
        }
        if let Some(last) = steps.last()
            && last.step > max_step
        {
            return Err(anyhow!(
                "constraint plan step {} exceeds max_step {max_step}",
                last.step
            ));
        }
        Ok(Self { max_step, steps })
    }
}

impl ConstraintSolver for PlannedConstraints {
    fn get_constraints(&self, step: u32, _geom: &Geometry) -> Result<StepConstraints> {
        let Some(planned) = self.steps.iter().find(|s| s.step >= step) else {
            debug!(step, "constraint plan exhausted");
            return Ok(StepConstraints {
                step: self.max_step + 1,
                set: ConstraintSet::default(),
            });
        };
        if planned.step != step {
            debug!(requested = step, planned = planned.step, "skipping unplanned steps");
        }
        Ok(StepConstraints {
            step: planned.step,
            set: ConstraintSet {
                fix: planned.fix.clone(),
                change: planned.change.clone(),
                release: planned.release.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> PlannedConstraints {
        PlannedConstraints::new(
            14,
            vec![
                PlannedStep {
                    step: 14,
                    fix: Vec::new(),
                    change: Vec::new(),
                    release: vec![Coordinate::new(vec![1, 2])],
                },
                PlannedStep {
                    step: 0,
                    fix: vec![Coordinate::new(vec![1, 2])],
                    change: vec![Change::new(vec![2, 3], 1.4)],
                    release: Vec::new(),
                },
            ],
        )
        .expect("plan")
    }

    #[test]
    fn returns_planned_step_verbatim() {
        let answer = plan().get_constraints(0, &Geometry::default()).expect("answer");
        assert_eq!(answer.step, 0);
        assert_eq!(answer.set.change, vec![Change::new(vec![2, 3], 1.4)]);
    }

    #[test]
    fn skips_to_next_planned_step() {
        let answer = plan().get_constraints(3, &Geometry::default()).expect("answer");
        assert_eq!(answer.step, 14);
        assert_eq!(answer.set.release, vec![Coordinate::new(vec![1, 2])]);
    }

    #[test]
    fn exhausted_plan_finishes() {
        let answer = plan().get_constraints(15, &Geometry::default()).expect("answer");
        assert_eq!(answer.step, 15);
        assert_eq!(answer.set, ConstraintSet::default());
    }

    #[test]
    fn rejects_duplicate_and_out_of_range_steps() {
        let entry = |step| PlannedStep {
            step,
            fix: Vec::new(),
            change: Vec::new(),
            release: Vec::new(),
        };
        assert!(PlannedConstraints::new(14, vec![entry(2), entry(2)]).is_err());
        assert!(PlannedConstraints::new(14, vec![entry(20)]).is_err());
    }
}
