//! Append-only geometry log (`bfgs_geom.log`).
//!
//! Several instances may share one log, so every record opens the file in
//! append mode, writes the whole record and flushes before the handle drops.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::geometry::{Geometry, snapshot};

pub const ORIGINAL_GEOM: &str = "Original Geom";
pub const NEW_GEOM: &str = "New Geom";

#[derive(Debug, Clone)]
pub struct GeomLog {
    path: PathBuf,
}

impl GeomLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one labelled snapshot.
    pub fn record(&self, label: &str, chemid: &str, atom: &[String], geom: &Geometry) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(snapshot(label, chemid, atom, geom).as_bytes())
            .with_context(|| format!("append to {}", self.path.display()))?;
        file.flush()
            .with_context(|| format!("flush {}", self.path.display()))
    }
}
