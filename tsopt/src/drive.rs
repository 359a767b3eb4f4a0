//! Multi-tick driver for `tsopt drive`.
//!
//! Calls [`StepAdvancer::advance`] until the instance is done, sleeping
//! between ticks while its job is still in flight.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::advance::StepAdvancer;
use crate::core::reaction::ReactionInstance;
use crate::core::state::StepState;
use crate::io::backend::QcBackend;
use crate::io::config::DriveConfig;
use crate::io::modifier::GeometryModifier;
use crate::io::solver::ConstraintSolver;
use crate::io::template::TemplateRenderer;

/// Reason why [`drive`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveStop {
    /// The step moved past `max_step`.
    Finished,
    /// `max_ticks` advance calls were made without finishing.
    TickLimit { max_ticks: u32 },
}

/// Summary of a drive invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOutcome {
    pub ticks: u32,
    pub final_step: u32,
    pub stop: DriveStop,
}

/// Advance `reaction` from `step` until it is done or the tick budget runs
/// out. `on_tick` sees every state. Errors from `advance` stop the drive.
pub fn drive<B, S, M, R, F>(
    advancer: &StepAdvancer<'_, B, S, M, R>,
    reaction: &ReactionInstance,
    step: u32,
    command: &str,
    cfg: &DriveConfig,
    mut on_tick: F,
) -> Result<DriveOutcome>
where
    B: QcBackend,
    S: ConstraintSolver,
    M: GeometryModifier,
    R: TemplateRenderer,
    F: FnMut(&StepState),
{
    let poll_interval = Duration::from_secs(cfg.poll_interval_secs);
    let mut step = step;
    let mut ticks = 0u32;

    while ticks < cfg.max_ticks {
        let state = advancer.advance(reaction, step, command)?;
        ticks += 1;
        on_tick(&state);
        step = state.step();

        if state.is_done(reaction.max_step) {
            info!(ticks, final_step = step, "drive finished");
            return Ok(DriveOutcome {
                ticks,
                final_step: step,
                stop: DriveStop::Finished,
            });
        }

        // Sleep only when the tick made no progress.
        if should_wait(state) && !poll_interval.is_zero() {
            debug!(secs = cfg.poll_interval_secs, "waiting before next poll");
            thread::sleep(poll_interval);
        }
    }

    info!(ticks, final_step = step, "drive hit tick limit");
    Ok(DriveOutcome {
        ticks,
        final_step: step,
        stop: DriveStop::TickLimit {
            max_ticks: cfg.max_ticks,
        },
    })
}

fn should_wait(state: StepState) -> bool {
    matches!(
        state,
        StepState::Polling(_)
            | StepState::Finished {
                submitted: false,
                ..
            }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constraints::{ConstraintSet, StepConstraints};
    use crate::core::types::QcStatus;
    use crate::io::modifier::CartesianModifier;
    use crate::test_support::{
        RecordingRenderer, ScriptedBackend, ScriptedSolver, five_atom_reaction, settings,
    };

    fn no_wait(max_ticks: u32) -> DriveConfig {
        DriveConfig {
            poll_interval_secs: 0,
            max_ticks,
        }
    }

    fn answer(step: u32) -> StepConstraints {
        StepConstraints {
            step,
            set: ConstraintSet::default(),
        }
    }

    #[test]
    fn drives_through_polls_to_completion() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = ScriptedBackend::new().with_statuses(vec![
            QcStatus::Running,
            QcStatus::Normal,
        ]);
        let solver = ScriptedSolver::new(vec![answer(13), answer(14)]);
        let renderer = RecordingRenderer::new();
        let advancer = StepAdvancer::new(
            &backend,
            &solver,
            &CartesianModifier,
            &renderer,
            settings(temp.path()),
        );
        let reaction = five_atom_reaction("rxn001");

        let mut seen = Vec::new();
        let outcome = drive(&advancer, &reaction, 0, "g16", &no_wait(10), |state| {
            seen.push(*state);
        })
        .expect("drive");

        assert_eq!(
            seen,
            vec![
                StepState::Finished {
                    step: 14,
                    submitted: true
                },
                StepState::Polling(14),
                StepState::Finished {
                    step: 15,
                    submitted: true
                },
            ]
        );
        assert_eq!(outcome.stop, DriveStop::Finished);
        assert_eq!(outcome.final_step, 15);
        assert_eq!(outcome.ticks, 3);
    }

    #[test]
    fn stops_at_tick_limit_while_polling() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = ScriptedBackend::new().with_status(QcStatus::Running);
        let solver = ScriptedSolver::new(Vec::new());
        let renderer = RecordingRenderer::new();
        let advancer = StepAdvancer::new(
            &backend,
            &solver,
            &CartesianModifier,
            &renderer,
            settings(temp.path()),
        );
        let outcome = drive(
            &advancer,
            &five_atom_reaction("rxn001"),
            3,
            "g16",
            &no_wait(4),
            |_| {},
        )
        .expect("drive");
        assert_eq!(
            outcome,
            DriveOutcome {
                ticks: 4,
                final_step: 3,
                stop: DriveStop::TickLimit { max_ticks: 4 },
            }
        );
    }
}
