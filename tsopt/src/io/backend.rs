//! Quantum-chemistry backend abstraction.
//!
//! The [`QcBackend`] trait is everything the step advancer needs from the
//! queueing / quantum-chemistry side: job status, results lookup, argument
//! construction and submission. [`QueueBackend`] submits job scripts through
//! a scheduler command and reads the result records the scripts write.
//! Tests use scripted backends that never touch a scheduler.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::arguments::{ArgumentRequest, LevelOfTheory, QcArguments, build_arguments};
use crate::core::geometry::Geometry;
use crate::core::types::{QcProgram, QcStatus};
use crate::io::config::TsoptConfig;
use crate::io::process::run_command_with_timeout;

/// Capabilities consumed from the quantum-chemistry backend.
pub trait QcBackend {
    /// Program identity, used for template selection.
    fn program(&self) -> QcProgram;

    /// Processors per job.
    fn ppn(&self) -> u32;

    /// Current status of the job named `name`.
    fn check_qc(&self, name: &str) -> Result<QcStatus>;

    /// Calculator arguments for a job.
    fn get_qc_arguments(&self, request: &ArgumentRequest<'_>) -> QcArguments;

    /// Whether the results store holds a record for `name`.
    fn is_in_database(&self, name: &str) -> Result<bool>;

    /// Vibrational frequencies of a finished job.
    fn get_qc_freq(&self, name: &str, natom: usize) -> Result<Vec<f64>>;

    /// Final geometry of a job. With `allow_error`, geometries of jobs that
    /// ended in error are returned too.
    fn get_qc_geom(&self, name: &str, natom: usize, allow_error: bool) -> Result<Geometry>;

    /// Submit the job script. Returns 1 when the job was taken, 0 when
    /// submission was deferred.
    fn submit_qc(&self, name: &str, script: &Path) -> Result<u32>;
}

/// Result record a job script writes to `<results_dir>/<name>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub status: QcStatus,
    #[serde(default)]
    pub geometry: Geometry,
    #[serde(default)]
    pub frequencies: Vec<f64>,
}

/// Backend that submits through a scheduler command and reads result records.
#[derive(Debug, Clone)]
pub struct QueueBackend {
    program: QcProgram,
    ppn: u32,
    level: LevelOfTheory,
    workdir: PathBuf,
    results_dir: PathBuf,
    submit_command: Vec<String>,
    max_jobs: u32,
    submit_timeout: Duration,
    output_limit_bytes: usize,
}

impl QueueBackend {
    pub fn from_config(cfg: &TsoptConfig, workdir: &Path) -> Self {
        Self {
            program: cfg.qc.program,
            ppn: cfg.qc.ppn,
            level: cfg.level.clone(),
            workdir: workdir.to_path_buf(),
            results_dir: workdir.join(&cfg.paths.results_dir),
            submit_command: cfg.queue.submit_command.clone(),
            max_jobs: cfg.queue.max_jobs,
            submit_timeout: Duration::from_secs(cfg.queue.submit_timeout_secs),
            output_limit_bytes: cfg.queue.output_limit_bytes,
        }
    }

    pub fn result_path(&self, name: &str) -> PathBuf {
        self.results_dir.join(format!("{name}.json"))
    }

    pub fn marker_path(&self, name: &str) -> PathBuf {
        self.results_dir.join(format!("{name}.submitted"))
    }

    fn read_record(&self, name: &str) -> Result<Option<ResultRecord>> {
        let path = self.result_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read result {}", path.display()))?;
        let record = serde_json::from_str(&contents)
            .with_context(|| format!("parse result {}", path.display()))?;
        Ok(Some(record))
    }

    fn require_record(&self, name: &str) -> Result<ResultRecord> {
        self.read_record(name)?
            .ok_or_else(|| anyhow!("no result for {name} in {}", self.results_dir.display()))
    }

    fn withdraw_marker(&self, name: &str) {
        let marker = self.marker_path(name);
        if let Err(err) = fs::remove_file(&marker) {
            warn!(error = %err, marker = %marker.display(), "could not remove submit marker");
        }
    }

    /// Submitted jobs that have not written a result yet.
    fn outstanding_jobs(&self) -> Result<usize> {
        if !self.results_dir.exists() {
            return Ok(0);
        }
        let mut count = 0;
        let entries = fs::read_dir(&self.results_dir)
            .with_context(|| format!("list {}", self.results_dir.display()))?;
        for entry in entries {
            let path = entry.context("read results entry")?.path();
            if path.extension().is_some_and(|ext| ext == "submitted")
                && !path.with_extension("json").exists()
            {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl QcBackend for QueueBackend {
    fn program(&self) -> QcProgram {
        self.program
    }

    fn ppn(&self) -> u32 {
        self.ppn
    }

    fn check_qc(&self, name: &str) -> Result<QcStatus> {
        if let Some(record) = self.read_record(name)? {
            return Ok(record.status);
        }
        if self.marker_path(name).exists() {
            return Ok(QcStatus::Running);
        }
        Ok(QcStatus::NotSubmitted)
    }

    fn get_qc_arguments(&self, request: &ArgumentRequest<'_>) -> QcArguments {
        build_arguments(self.program, self.ppn, &self.level, request)
    }

    fn is_in_database(&self, name: &str) -> Result<bool> {
        Ok(self.result_path(name).exists())
    }

    fn get_qc_freq(&self, name: &str, natom: usize) -> Result<Vec<f64>> {
        let record = self.require_record(name)?;
        if record.status != QcStatus::Normal {
            return Err(anyhow!("{name} ended with status {}", record.status));
        }
        // Linear molecules have 3N-5 modes, everything else 3N-6.
        let expected_max = (3 * natom).saturating_sub(5);
        if record.frequencies.len() > expected_max {
            return Err(anyhow!(
                "{name} reports {} frequencies for {natom} atoms",
                record.frequencies.len()
            ));
        }
        Ok(record.frequencies)
    }

    fn get_qc_geom(&self, name: &str, natom: usize, allow_error: bool) -> Result<Geometry> {
        let record = self.require_record(name)?;
        match record.status {
            QcStatus::Normal => {}
            QcStatus::Error if allow_error => {
                debug!(name, "using geometry of errored job");
            }
            status => return Err(anyhow!("{name} ended with status {status}")),
        }
        if record.geometry.len() != natom {
            return Err(anyhow!(
                "{name} geometry has {} atoms, expected {natom}",
                record.geometry.len()
            ));
        }
        Ok(record.geometry)
    }

    #[instrument(skip_all, fields(name = %name, script = %script.display()))]
    fn submit_qc(&self, name: &str, script: &Path) -> Result<u32> {
        let outstanding = self.outstanding_jobs()?;
        if outstanding >= self.max_jobs as usize {
            info!(outstanding, max_jobs = self.max_jobs, "queue full, deferring submission");
            return Ok(0);
        }

        let (program, args) = self
            .submit_command
            .split_first()
            .ok_or_else(|| anyhow!("queue.submit_command is empty"))?;

        // The job may finish before the submit command returns, so the stale
        // result goes and the marker lands first.
        fs::create_dir_all(&self.results_dir)
            .with_context(|| format!("create {}", self.results_dir.display()))?;
        let result_path = self.result_path(name);
        if result_path.exists() {
            fs::remove_file(&result_path)
                .with_context(|| format!("remove stale result {}", result_path.display()))?;
        }
        let marker = self.marker_path(name);
        fs::write(&marker, "\n").with_context(|| format!("write {}", marker.display()))?;

        let mut cmd = Command::new(program);
        cmd.args(args).arg(script).current_dir(&self.workdir);
        let result = run_command_with_timeout(cmd, self.submit_timeout, self.output_limit_bytes)
            .with_context(|| format!("submit {name}"));
        let output = match result {
            Ok(output) => output,
            Err(err) => {
                self.withdraw_marker(name);
                return Err(err);
            }
        };
        if !output.success() {
            warn!(
                exit_code = ?output.status.code(),
                timed_out = output.timed_out,
                stderr = %output.stderr_text(),
                "submission failed"
            );
            self.withdraw_marker(name);
            return Ok(0);
        }

        let job_id = output.first_line().unwrap_or_default();
        fs::write(&marker, format!("{job_id}\n"))
            .with_context(|| format!("write {}", marker.display()))?;
        info!(job = %job_id, "submitted");
        Ok(1)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::io::config::QueueConfig;

    fn backend(root: &Path, submit: &[&str], max_jobs: u32) -> QueueBackend {
        let cfg = TsoptConfig {
            queue: QueueConfig {
                submit_command: submit.iter().map(|s| s.to_string()).collect(),
                max_jobs,
                ..QueueConfig::default()
            },
            ..TsoptConfig::default()
        };
        QueueBackend::from_config(&cfg, root)
    }

    fn write_record(backend: &QueueBackend, name: &str, record: &ResultRecord) {
        fs::create_dir_all(&backend.results_dir).expect("mkdir");
        fs::write(
            backend.result_path(name),
            serde_json::to_string(record).expect("json"),
        )
        .expect("write");
    }

    #[test]
    fn status_follows_marker_then_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = backend(temp.path(), &["true"], 10);
        assert_eq!(backend.check_qc("rxn").expect("status"), QcStatus::NotSubmitted);

        let script = temp.path().join("rxn.py");
        fs::write(&script, "").expect("script");
        assert_eq!(backend.submit_qc("rxn", &script).expect("submit"), 1);
        assert_eq!(backend.check_qc("rxn").expect("status"), QcStatus::Running);

        write_record(
            &backend,
            "rxn",
            &ResultRecord {
                status: QcStatus::Error,
                geometry: Geometry::new(vec![[0.0; 3]; 2]),
                frequencies: Vec::new(),
            },
        );
        assert_eq!(backend.check_qc("rxn").expect("status"), QcStatus::Error);
        assert!(backend.is_in_database("rxn").expect("db"));
    }

    #[test]
    fn failed_submit_command_defers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = backend(temp.path(), &["false"], 10);
        let script = temp.path().join("rxn.py");
        fs::write(&script, "").expect("script");
        assert_eq!(backend.submit_qc("rxn", &script).expect("submit"), 0);
        assert!(!backend.marker_path("rxn").exists());
    }

    #[test]
    fn result_written_during_submission_is_kept() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = backend(
            temp.path(),
            &[
                "sh",
                "-c",
                r#"mkdir -p results && echo '{"status": "normal"}' > results/rxn.json"#,
            ],
            10,
        );
        write_record(
            &backend,
            "rxn",
            &ResultRecord {
                status: QcStatus::Error,
                geometry: Geometry::default(),
                frequencies: Vec::new(),
            },
        );
        let script = temp.path().join("rxn.py");
        fs::write(&script, "").expect("script");

        assert_eq!(backend.submit_qc("rxn", &script).expect("submit"), 1);
        assert_eq!(backend.check_qc("rxn").expect("status"), QcStatus::Normal);
        assert!(backend.marker_path("rxn").exists());
    }

    #[test]
    fn full_queue_defers_without_running_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = backend(temp.path(), &["true"], 1);
        fs::create_dir_all(&backend.results_dir).expect("mkdir");
        fs::write(backend.marker_path("other"), "1\n").expect("marker");

        let script = temp.path().join("rxn.py");
        fs::write(&script, "").expect("script");
        assert_eq!(backend.submit_qc("rxn", &script).expect("submit"), 0);
    }

    #[test]
    fn errored_geometry_requires_allow_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = backend(temp.path(), &["true"], 10);
        write_record(
            &backend,
            "rxn",
            &ResultRecord {
                status: QcStatus::Error,
                geometry: Geometry::new(vec![[1.0, 2.0, 3.0]]),
                frequencies: Vec::new(),
            },
        );
        assert!(backend.get_qc_geom("rxn", 1, false).is_err());
        let geom = backend.get_qc_geom("rxn", 1, true).expect("geom");
        assert_eq!(geom.point(0), [1.0, 2.0, 3.0]);
        assert!(backend.get_qc_geom("rxn", 2, true).is_err());
    }

    #[test]
    fn frequencies_require_normal_termination() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = backend(temp.path(), &["true"], 10);
        write_record(
            &backend,
            "rxn",
            &ResultRecord {
                status: QcStatus::Normal,
                geometry: Geometry::new(vec![[0.0; 3]; 3]),
                frequencies: vec![-1200.0, 400.0, 1600.0],
            },
        );
        assert_eq!(backend.get_qc_freq("rxn", 3).expect("freq").len(), 3);
        assert!(backend.get_qc_freq("missing", 3).is_err());
    }
}
