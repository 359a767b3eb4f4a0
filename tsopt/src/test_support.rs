//! Test doubles and fixtures shared by unit and integration tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::advance::AdvanceSettings;
use crate::core::arguments::{ArgumentRequest, LevelOfTheory, QcArguments, build_arguments};
use crate::core::constraints::{Change, StepConstraints};
use crate::core::geometry::{Geometry, Species};
use crate::core::reaction::ReactionInstance;
use crate::core::types::{QcProgram, QcStatus, TemplateKind};
use crate::io::backend::QcBackend;
use crate::io::config::{SearchConfig, TsoptConfig, write_config};
use crate::io::geom_log::GeomLog;
use crate::io::modifier::{CartesianModifier, GeometryModifier, ModifiedGeometry};
use crate::io::solver::ConstraintSolver;
use crate::io::template::{ScriptContext, TemplateRenderer};

/// Backend capability invoked, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CheckQc,
    GetArguments { step: u32 },
    IsInDatabase,
    GetFreq,
    GetGeom { allow_error: bool },
    Submit,
}

/// Backend answering from fixed values and recording every call.
#[derive(Debug)]
pub struct ScriptedBackend {
    program: QcProgram,
    ppn: u32,
    status: RefCell<VecDeque<QcStatus>>,
    status_fails: bool,
    in_database: bool,
    frequencies: Option<Vec<f64>>,
    geometry: Option<Geometry>,
    increment: u32,
    submit_fails: bool,
    calls: RefCell<Vec<BackendCall>>,
    submitted: RefCell<Vec<PathBuf>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// Gaussian backend, nothing submitted, nothing in the database.
    pub fn new() -> Self {
        Self {
            program: QcProgram::Gauss,
            ppn: 1,
            status: RefCell::new(VecDeque::from([QcStatus::NotSubmitted])),
            status_fails: false,
            in_database: false,
            frequencies: None,
            geometry: None,
            increment: 1,
            submit_fails: false,
            calls: RefCell::new(Vec::new()),
            submitted: RefCell::new(Vec::new()),
        }
    }

    pub fn with_program(mut self, program: QcProgram) -> Self {
        self.program = program;
        self
    }

    pub fn with_status(self, status: QcStatus) -> Self {
        self.with_statuses(vec![status])
    }

    /// Statuses handed out in order; the last one repeats.
    pub fn with_statuses(mut self, statuses: Vec<QcStatus>) -> Self {
        self.status = RefCell::new(statuses.into());
        self
    }

    pub fn failing_status(mut self) -> Self {
        self.status_fails = true;
        self
    }

    /// A finished earlier run with the given frequencies.
    pub fn with_database(mut self, frequencies: Vec<f64>) -> Self {
        self.in_database = true;
        self.frequencies = Some(frequencies);
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_increment(mut self, increment: u32) -> Self {
        self.increment = increment;
        self
    }

    pub fn failing_submit(mut self) -> Self {
        self.submit_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.borrow().clone()
    }

    pub fn submitted(&self) -> Vec<PathBuf> {
        self.submitted.borrow().clone()
    }

    fn record(&self, call: BackendCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl QcBackend for ScriptedBackend {
    fn program(&self) -> QcProgram {
        self.program
    }

    fn ppn(&self) -> u32 {
        self.ppn
    }

    fn check_qc(&self, _name: &str) -> Result<QcStatus> {
        self.record(BackendCall::CheckQc);
        if self.status_fails {
            return Err(anyhow!("scheduler unreachable"));
        }
        let mut queue = self.status.borrow_mut();
        let status = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        status.ok_or_else(|| anyhow!("no scripted status"))
    }

    fn get_qc_arguments(&self, request: &ArgumentRequest<'_>) -> QcArguments {
        self.record(BackendCall::GetArguments { step: request.step });
        build_arguments(self.program, self.ppn, &LevelOfTheory::default(), request)
    }

    fn is_in_database(&self, _name: &str) -> Result<bool> {
        self.record(BackendCall::IsInDatabase);
        Ok(self.in_database)
    }

    fn get_qc_freq(&self, name: &str, _natom: usize) -> Result<Vec<f64>> {
        self.record(BackendCall::GetFreq);
        self.frequencies
            .clone()
            .ok_or_else(|| anyhow!("no frequencies for {name}"))
    }

    fn get_qc_geom(&self, name: &str, _natom: usize, allow_error: bool) -> Result<Geometry> {
        self.record(BackendCall::GetGeom { allow_error });
        self.geometry
            .clone()
            .ok_or_else(|| anyhow!("no geometry for {name}"))
    }

    fn submit_qc(&self, name: &str, script: &Path) -> Result<u32> {
        self.record(BackendCall::Submit);
        if self.submit_fails {
            return Err(anyhow!("submit of {name} rejected"));
        }
        self.submitted.borrow_mut().push(script.to_path_buf());
        Ok(self.increment)
    }
}

/// Solver replaying queued answers and recording what it was asked.
#[derive(Debug, Default)]
pub struct ScriptedSolver {
    answers: RefCell<VecDeque<StepConstraints>>,
    requests: RefCell<Vec<(u32, Geometry)>>,
}

impl ScriptedSolver {
    pub fn new(answers: Vec<StepConstraints>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(u32, Geometry)> {
        self.requests.borrow().clone()
    }
}

impl ConstraintSolver for ScriptedSolver {
    fn get_constraints(&self, step: u32, geom: &Geometry) -> Result<StepConstraints> {
        self.requests.borrow_mut().push((step, geom.clone()));
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted constraints for step {step}"))
    }
}

/// Cartesian modifier that records the changes it was given.
#[derive(Debug, Default)]
pub struct RecordingModifier {
    changes: RefCell<Vec<Vec<Change>>>,
}

impl RecordingModifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<Vec<Change>> {
        self.changes.borrow().clone()
    }
}

impl GeometryModifier for RecordingModifier {
    fn modify_coordinates(
        &self,
        species: &Species,
        name: &str,
        geom: &Geometry,
        changes: &[Change],
        bonds: &[Vec<u8>],
    ) -> Result<ModifiedGeometry> {
        self.changes.borrow_mut().push(changes.to_vec());
        CartesianModifier.modify_coordinates(species, name, geom, changes, bonds)
    }
}

/// Renderer that records template choices and contexts.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    calls: RefCell<Vec<(TemplateKind, ScriptContext)>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(TemplateKind, ScriptContext)> {
        self.calls.borrow().clone()
    }
}

impl TemplateRenderer for RecordingRenderer {
    fn render(
        &self,
        program: QcProgram,
        kind: TemplateKind,
        ctx: &ScriptContext,
    ) -> Result<String> {
        self.calls.borrow_mut().push((kind, ctx.clone()));
        Ok(format!("# {} {:?} {}\n", program, kind, ctx.label))
    }
}

/// Chain H3-C0-C1-O2-H4 in the xy plane; bonds are perceived.
pub fn five_atom_species() -> Species {
    let mut species = Species {
        chemid: "240010000000000000001".to_string(),
        atom: ["C", "C", "O", "H", "H"].map(String::from).to_vec(),
        geom: Geometry::new(vec![
            [0.0, 0.0, 0.0],
            [1.5, 0.0, 0.0],
            [2.2, 1.2, 0.0],
            [-0.6, 0.9, 0.0],
            [2.0, 2.15, 0.0],
        ]),
        mult: 1,
        charge: 0,
        bond: Vec::new(),
    };
    species.ensure_bonds();
    species
}

/// Reaction on [`five_atom_species`] with a five-entry instance and
/// `max_step = 14`.
pub fn five_atom_reaction(name: &str) -> ReactionInstance {
    ReactionInstance {
        instance_name: name.to_string(),
        instance: vec![1, 2, 3, 4, 5],
        max_step: 14,
        scan: false,
        skip: false,
        species: five_atom_species(),
    }
}

/// Default settings rooted at `workdir`.
pub fn settings(workdir: &Path) -> AdvanceSettings {
    AdvanceSettings {
        workdir: workdir.to_path_buf(),
        results_dir: workdir.join("results"),
        geom_log: GeomLog::new(workdir.join("bfgs_geom.log")),
        search: SearchConfig::default(),
    }
}

/// Temporary working directory with a config file and reaction inputs.
pub struct TestWorkdir {
    dir: tempfile::TempDir,
}

impl TestWorkdir {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp workdir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_config(&self, cfg: &TsoptConfig) -> Result<PathBuf> {
        let path = self.path().join("tsopt.toml");
        write_config(&path, cfg)?;
        Ok(path)
    }

    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn read_file(&self, name: &str) -> Result<String> {
        let path = self.path().join(name);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}
