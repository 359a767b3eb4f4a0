//! Configuration stored in `tsopt.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::arguments::LevelOfTheory;
use crate::core::types::{QcProgram, SearchAlgorithm};

/// Default config file name, relative to the working directory.
pub const CONFIG_FILE: &str = "tsopt.toml";

/// Top-level configuration (TOML).
///
/// Edited by humans; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TsoptConfig {
    pub qc: QcConfig,
    pub level: LevelOfTheory,
    pub queue: QueueConfig,
    pub paths: PathsConfig,
    pub search: SearchConfig,
    pub drive: DriveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QcConfig {
    /// Program behind the backend; selects templates and argument layout.
    pub program: QcProgram,
    /// Processors per job.
    pub ppn: u32,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            program: QcProgram::Gauss,
            ppn: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Command used to submit a job script; the script path is appended.
    pub submit_command: Vec<String>,
    /// Jobs allowed in flight before submission is deferred.
    pub max_jobs: u32,
    pub submit_timeout_secs: u64,
    /// Truncate captured submit output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            submit_command: vec!["sbatch".to_string()],
            max_jobs: 100,
            submit_timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory searched for job-script templates before the bundled ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
    /// Where job scripts write `<name>.json` result records.
    pub results_dir: PathBuf,
    /// Append-only geometry log shared by all instances.
    pub geom_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            template_dir: None,
            results_dir: PathBuf::from("results"),
            geom_log: PathBuf::from("bfgs_geom.log"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub algorithm: SearchAlgorithm,
    /// Force-convergence threshold handed to the PCOBFGS optimizer.
    pub conv_crit: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            algorithm: SearchAlgorithm::Default,
            conv_crit: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriveConfig {
    /// Seconds to wait between polls while a job is running.
    pub poll_interval_secs: u64,
    /// Stop driving after this many advance calls.
    pub max_ticks: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            max_ticks: 10_000,
        }
    }
}

impl TsoptConfig {
    pub fn validate(&self) -> Result<()> {
        if self.qc.ppn == 0 {
            return Err(anyhow!("qc.ppn must be > 0"));
        }
        if self.queue.submit_command.is_empty() || self.queue.submit_command[0].trim().is_empty() {
            return Err(anyhow!("queue.submit_command must be a non-empty array"));
        }
        if self.queue.max_jobs == 0 {
            return Err(anyhow!("queue.max_jobs must be > 0"));
        }
        if self.queue.submit_timeout_secs == 0 {
            return Err(anyhow!("queue.submit_timeout_secs must be > 0"));
        }
        if self.queue.output_limit_bytes == 0 {
            return Err(anyhow!("queue.output_limit_bytes must be > 0"));
        }
        if self.search.conv_crit.is_nan() || self.search.conv_crit <= 0.0 {
            return Err(anyhow!("search.conv_crit must be > 0"));
        }
        if self.drive.max_ticks == 0 {
            return Err(anyhow!("drive.max_ticks must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TsoptConfig::default()`.
pub fn load_config(path: &Path) -> Result<TsoptConfig> {
    if !path.exists() {
        let cfg = TsoptConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TsoptConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TsoptConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, TsoptConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tsopt.toml");
        let cfg = TsoptConfig {
            paths: PathsConfig {
                template_dir: Some(PathBuf::from("tpl")),
                ..PathsConfig::default()
            },
            ..TsoptConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tsopt.toml");
        fs::write(
            &path,
            "[qc]\nprogram = \"nwchem\"\nppn = 8\n\n[search]\nalgorithm = \"pcobfgs\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.qc.program, QcProgram::Nwchem);
        assert_eq!(cfg.qc.ppn, 8);
        assert_eq!(cfg.search.algorithm, SearchAlgorithm::Pcobfgs);
        assert_eq!(cfg.search.conv_crit, 0.01);
        assert_eq!(cfg.paths.geom_log, PathBuf::from("bfgs_geom.log"));
    }

    #[test]
    fn validate_rejects_empty_submit_command() {
        let cfg = TsoptConfig {
            queue: QueueConfig {
                submit_command: Vec::new(),
                ..QueueConfig::default()
            },
            ..TsoptConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("submit_command"));
    }
}
