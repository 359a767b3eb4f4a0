//! Orchestration for a single `tsopt advance` call.
//!
//! [`StepAdvancer::advance`] gathers facts from the backend and solver, feeds
//! them through the pure transitions in [`crate::core::state`] and performs
//! the side effects the resulting state asks for: geometry-log records, the
//! rendered job script and its submission.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::arguments::{ArgumentRequest, QcArguments};
use crate::core::constraints::ConstraintSet;
use crate::core::geometry::Geometry;
use crate::core::reaction::ReactionInstance;
use crate::core::state::{self, StartFacts, StepState};
use crate::core::types::{QcStatus, SearchAlgorithm, TemplateKind};
use crate::io::backend::QcBackend;
use crate::io::config::{SearchConfig, TsoptConfig};
use crate::io::geom_log::{GeomLog, NEW_GEOM, ORIGINAL_GEOM};
use crate::io::job_script::write_job_script;
use crate::io::modifier::GeometryModifier;
use crate::io::solver::ConstraintSolver;
use crate::io::template::{ScriptContext, TemplateRenderer};

/// Filesystem locations and algorithm settings for the advancer.
#[derive(Debug, Clone)]
pub struct AdvanceSettings {
    /// Directory job scripts are written to and the search runs in.
    pub workdir: PathBuf,
    /// Directory job scripts write their result records to.
    pub results_dir: PathBuf,
    pub geom_log: GeomLog,
    pub search: SearchConfig,
}

impl AdvanceSettings {
    pub fn from_config(cfg: &TsoptConfig, workdir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            results_dir: workdir.join(&cfg.paths.results_dir),
            geom_log: GeomLog::new(workdir.join(&cfg.paths.geom_log)),
            search: cfg.search.clone(),
        }
    }
}

/// Advances reaction instances one step at a time.
pub struct StepAdvancer<'a, B, S, M, R> {
    backend: &'a B,
    solver: &'a S,
    modifier: &'a M,
    renderer: &'a R,
    settings: AdvanceSettings,
}

impl<'a, B, S, M, R> StepAdvancer<'a, B, S, M, R>
where
    B: QcBackend,
    S: ConstraintSolver,
    M: GeometryModifier,
    R: TemplateRenderer,
{
    pub fn new(
        backend: &'a B,
        solver: &'a S,
        modifier: &'a M,
        renderer: &'a R,
        settings: AdvanceSettings,
    ) -> Self {
        Self {
            backend,
            solver,
            modifier,
            renderer,
            settings,
        }
    }

    /// Advance `reaction` from `step`.
    ///
    /// `command` is the program execution command baked into search scripts.
    /// The returned state's [`StepState::step`] is the step to call with
    /// next; it never goes below `step`. Backend hiccups degrade to fallbacks
    /// and never surface as errors; template, file and constraint problems do.
    #[instrument(skip_all, fields(instance = %reaction.instance_name, step = step))]
    pub fn advance(
        &self,
        reaction: &ReactionInstance,
        step: u32,
        command: &str,
    ) -> Result<StepState> {
        let name = reaction.instance_name.as_str();
        let species = &reaction.species;
        let incoming = step;

        if step > 0 {
            let status = self.poll_status(name);
            if let Some(polling) = state::poll(step, status) {
                debug!(%status, "job not settled");
                return Ok(polling);
            }
        }

        let mut args = self.backend.get_qc_arguments(&ArgumentRequest {
            name,
            mult: species.mult,
            charge: species.charge,
            ts: true,
            step,
            max_step: reaction.max_step,
            scan: reaction.scan,
        });

        let (step, geom) = if step == 0 {
            let facts = StartFacts {
                already_converged: self.already_converged(name, species.natom()),
                skip: reaction.skip,
                instance_len: reaction.instance.len(),
                max_step: reaction.max_step,
            };
            match state::start(facts) {
                StepState::NeedsConstraints(start) => (start, species.geom.clone()),
                done => {
                    info!(next = done.step(), "already converged");
                    return Ok(done);
                }
            }
        } else {
            (step, self.step_geometry(reaction))
        };

        let answer = self
            .solver
            .get_constraints(step, &geom)
            .with_context(|| format!("get constraints for {name} step {step}"))?;
        let step = state::accept_solver_step(step, answer.step)?;
        if let Some(done) = state::check_bound(step, reaction.max_step) {
            info!(next = done.step(), "procedure finished");
            return Ok(done);
        }

        let kind = state::template_kind(step, reaction.max_step, self.settings.search.algorithm);
        if kind == TemplateKind::End && incoming < reaction.max_step {
            debug!(incoming, "solver jumped to the final step, arguments keep search settings");
        }
        let ctx = match self.settings.search.algorithm {
            SearchAlgorithm::Default => {
                self.default_context(reaction, step, kind, geom, &answer.set, args, command)?
            }
            SearchAlgorithm::Pcobfgs => {
                if kind.is_search() {
                    args.remove("opt");
                }
                self.pcobfgs_context(reaction, kind, geom, &answer.set, args, command)?
            }
        };

        let script = self
            .renderer
            .render(self.backend.program(), kind, &ctx)
            .with_context(|| format!("render job script for {name}"))?;
        let script_path = write_job_script(&self.settings.workdir, name, &script)?;

        let increment = match self.backend.submit_qc(name, &script_path) {
            Ok(increment) => increment,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "submission failed, will retry next call");
                0
            }
        };
        let finished = state::finish(step, increment);
        info!(?kind, next = finished.step(), submitted = increment > 0, "step advanced");
        Ok(finished)
    }

    /// Normalize constraints, apply coordinate changes and lock them as
    /// fixed, logging the geometry before and after.
    #[allow(clippy::too_many_arguments)]
    fn default_context(
        &self,
        reaction: &ReactionInstance,
        step: u32,
        kind: TemplateKind,
        geom: Geometry,
        raw: &ConstraintSet,
        mut args: QcArguments,
        command: &str,
    ) -> Result<ScriptContext> {
        let species = &reaction.species;
        let name = reaction.instance_name.as_str();
        let mut set = raw
            .to_zero_based(species.natom())
            .with_context(|| format!("constraints for {name} step {step}"))?;

        self.settings
            .geom_log
            .record(ORIGINAL_GEOM, &species.chemid, &species.atom, &geom)?;

        let geom = if set.change.is_empty() {
            geom
        } else {
            let modified = self
                .modifier
                .modify_coordinates(species, name, &geom, &set.change, &species.bond)
                .with_context(|| format!("modify geometry of {name}"))?;
            if !modified.success {
                warn!("coordinate changes missed their targets, using the closest geometry");
            }
            if modified.geometry.len() != species.natom() {
                return Err(anyhow!(
                    "geometry modifier returned {} atoms for {name}, expected {}",
                    modified.geometry.len(),
                    species.natom()
                ));
            }
            if !modified.geometry.is_finite() {
                return Err(anyhow!(
                    "geometry modifier returned non-finite coordinates for {name}"
                ));
            }
            set.lock_changes();
            modified.geometry
        };

        self.settings
            .geom_log
            .record(NEW_GEOM, &species.chemid, &species.atom, &geom)?;

        args.merge_constraints(&set.fix, &set.change, &set.release);
        Ok(self.script_context(reaction, kind, &geom, args, command))
    }

    /// Hand the solver's constraints to the PCOBFGS optimizer untouched.
    fn pcobfgs_context(
        &self,
        reaction: &ReactionInstance,
        kind: TemplateKind,
        geom: Geometry,
        raw: &ConstraintSet,
        args: QcArguments,
        command: &str,
    ) -> Result<ScriptContext> {
        let mut ctx = self.script_context(reaction, kind, &geom, args, command);
        if kind.is_search() {
            ctx.fix = Some(serde_json::to_value(&raw.fix).context("serialize fix list")?);
            ctx.change = Some(serde_json::to_value(&raw.change).context("serialize change list")?);
            ctx.conv_crit = Some(self.settings.search.conv_crit);
        }
        Ok(ctx)
    }

    fn script_context(
        &self,
        reaction: &ReactionInstance,
        kind: TemplateKind,
        geom: &Geometry,
        args: QcArguments,
        command: &str,
    ) -> ScriptContext {
        let search = kind.is_search();
        ScriptContext {
            label: reaction.instance_name.clone(),
            kwargs: args.to_value(),
            atom: reaction.species.atom.clone(),
            geom: geom.points().to_vec(),
            ppn: self.backend.ppn(),
            results_dir: self.settings.results_dir.display().to_string(),
            qc_command: search.then(|| command.to_string()),
            working_dir: search.then(|| self.settings.workdir.display().to_string()),
            fix: None,
            change: None,
            conv_crit: None,
        }
    }

    /// Status of the running job; a failed poll counts as still running.
    fn poll_status(&self, name: &str) -> QcStatus {
        self.backend.check_qc(name).unwrap_or_else(|err| {
            warn!(error = %format!("{err:#}"), "status poll failed, treating job as running");
            QcStatus::Running
        })
    }

    /// Whether an earlier run already produced a converged saddle point.
    fn already_converged(&self, name: &str, natom: usize) -> bool {
        let check = || -> Result<bool> {
            if !self.backend.is_in_database(name)? {
                return Ok(false);
            }
            if self.backend.check_qc(name)? != QcStatus::Normal {
                return Ok(false);
            }
            Ok(!self.backend.get_qc_freq(name, natom)?.is_empty())
        };
        check().unwrap_or_else(|err| {
            debug!(error = %format!("{err:#}"), "no usable earlier result");
            false
        })
    }

    /// Geometry the last job left behind, or the species geometry when it
    /// cannot be used.
    fn step_geometry(&self, reaction: &ReactionInstance) -> Geometry {
        let species = &reaction.species;
        let natom = species.natom();
        match self
            .backend
            .get_qc_geom(&reaction.instance_name, natom, true)
        {
            Ok(geom) if geom.len() == natom => geom,
            Ok(geom) => {
                warn!(
                    atoms = geom.len(),
                    natom, "job geometry has the wrong size, using species geometry"
                );
                species.geom.clone()
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "job geometry unavailable, using species geometry");
                species.geom.clone()
            }
        }
    }
}
