//! Explicit step state and the pure transitions between states.
//!
//! The step counter used to double as phase marker and completion sentinel.
//! Here every decision point is a function from plain facts to a
//! [`StepState`]; the orchestrator gathers the facts with I/O and performs
//! whatever side effect the returned state calls for.

use anyhow::{Result, anyhow};

use crate::core::types::{QcStatus, SearchAlgorithm, TemplateKind};

/// Step at which short instances resume when `skip` is set.
pub const SKIP_TO_STEP: u32 = 12;

/// Instances with fewer motion atoms than this may skip the early steps.
pub const SHORT_INSTANCE_LEN: usize = 4;

/// Where a reaction instance stands after (part of) an advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// A job for this step is still in flight; re-poll with the same step.
    Polling(u32),
    /// Ready to ask the constraint solver for this step.
    NeedsConstraints(u32),
    /// A previous run already converged; the carried step is `max_step + 1`.
    Converged(u32),
    /// The solver moved the step past `max_step`; nothing left to run.
    Terminated(u32),
    /// The job script was written and submission attempted.
    Finished { step: u32, submitted: bool },
}

impl StepState {
    /// Step counter to hand back to the caller.
    pub fn step(self) -> u32 {
        match self {
            Self::Polling(step)
            | Self::NeedsConstraints(step)
            | Self::Converged(step)
            | Self::Terminated(step)
            | Self::Finished { step, .. } => step,
        }
    }

    /// Whether the procedure has nothing more to do for this instance.
    pub fn is_done(self, max_step: u32) -> bool {
        match self {
            Self::Converged(_) | Self::Terminated(_) => true,
            other => other.step() > max_step,
        }
    }
}

/// Suspend the step while a previously submitted job is unsettled.
///
/// Step 0 never polls: nothing has been submitted for it yet.
pub fn poll(step: u32, status: QcStatus) -> Option<StepState> {
    if step > 0 && !status.is_settled() {
        return Some(StepState::Polling(step));
    }
    None
}

/// Facts gathered before the first step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartFacts {
    /// Backend holds a normal-terminated result with at least one frequency.
    pub already_converged: bool,
    pub skip: bool,
    pub instance_len: usize,
    pub max_step: u32,
}

/// Decide how step 0 proceeds.
pub fn start(facts: StartFacts) -> StepState {
    if facts.already_converged {
        return StepState::Converged(facts.max_step + 1);
    }
    if facts.skip && facts.instance_len < SHORT_INSTANCE_LEN {
        return StepState::NeedsConstraints(SKIP_TO_STEP);
    }
    StepState::NeedsConstraints(0)
}

/// Accept the solver's step, enforcing that the counter never goes back.
pub fn accept_solver_step(requested: u32, returned: u32) -> Result<u32> {
    if returned < requested {
        return Err(anyhow!(
            "constraint solver moved step back from {requested} to {returned}"
        ));
    }
    Ok(returned)
}

/// Stop when the solver's step is past the last step.
pub fn check_bound(step: u32, max_step: u32) -> Option<StepState> {
    if step > max_step {
        return Some(StepState::Terminated(step));
    }
    None
}

/// Select the job-script template for a step.
pub fn template_kind(step: u32, max_step: u32, algorithm: SearchAlgorithm) -> TemplateKind {
    if step >= max_step {
        return TemplateKind::End;
    }
    match algorithm {
        SearchAlgorithm::Default => TemplateKind::Search,
        SearchAlgorithm::Pcobfgs => TemplateKind::SearchPcobfgs,
    }
}

/// Apply the backend's submission increment (0 when the job was not taken).
pub fn finish(step: u32, increment: u32) -> StepState {
    StepState::Finished {
        step: step + increment.min(1),
        submitted: increment > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> StartFacts {
        StartFacts {
            already_converged: false,
            skip: false,
            instance_len: 6,
            max_step: 14,
        }
    }

    #[test]
    fn poll_suspends_only_unsettled_later_steps() {
        assert_eq!(poll(3, QcStatus::Running), Some(StepState::Polling(3)));
        assert_eq!(poll(3, QcStatus::Killed), Some(StepState::Polling(3)));
        assert_eq!(poll(3, QcStatus::Normal), None);
        assert_eq!(poll(3, QcStatus::Error), None);
        assert_eq!(poll(0, QcStatus::Running), None);
    }

    #[test]
    fn converged_start_jumps_past_max_step() {
        let state = start(StartFacts {
            already_converged: true,
            skip: true,
            instance_len: 2,
            ..facts()
        });
        assert_eq!(state, StepState::Converged(15));
        assert!(state.is_done(14));
    }

    #[test]
    fn short_skipped_instances_start_at_twelve() {
        let state = start(StartFacts {
            skip: true,
            instance_len: 3,
            ..facts()
        });
        assert_eq!(state, StepState::NeedsConstraints(SKIP_TO_STEP));
    }

    #[test]
    fn long_or_unskipped_instances_start_at_zero() {
        assert_eq!(
            start(StartFacts {
                skip: true,
                instance_len: 4,
                ..facts()
            }),
            StepState::NeedsConstraints(0)
        );
        assert_eq!(
            start(StartFacts {
                instance_len: 2,
                ..facts()
            }),
            StepState::NeedsConstraints(0)
        );
    }

    #[test]
    fn solver_may_advance_but_not_rewind() {
        assert_eq!(accept_solver_step(2, 5).expect("advance"), 5);
        assert!(accept_solver_step(5, 2).is_err());
    }

    #[test]
    fn bound_terminates_past_max_step_only() {
        assert_eq!(check_bound(15, 14), Some(StepState::Terminated(15)));
        assert_eq!(check_bound(14, 14), None);
    }

    #[test]
    fn template_kind_follows_step_and_algorithm() {
        assert_eq!(
            template_kind(3, 14, SearchAlgorithm::Default),
            TemplateKind::Search
        );
        assert_eq!(
            template_kind(3, 14, SearchAlgorithm::Pcobfgs),
            TemplateKind::SearchPcobfgs
        );
        assert_eq!(template_kind(14, 14, SearchAlgorithm::Default), TemplateKind::End);
        assert_eq!(template_kind(14, 14, SearchAlgorithm::Pcobfgs), TemplateKind::End);
    }

    #[test]
    fn finish_adds_submission_increment() {
        assert_eq!(
            finish(4, 1),
            StepState::Finished {
                step: 5,
                submitted: true
            }
        );
        assert_eq!(
            finish(4, 0),
            StepState::Finished {
                step: 4,
                submitted: false
            }
        );
    }
}
