//! Job-script rendering.
//!
//! Templates are Python scripts with minijinja placeholders. Every value is
//! emitted through the `py` filter, so what reaches the script is a Python
//! literal in the format fixed by [`SCRIPT_SCHEMA_VERSION`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use minijinja::{AutoEscape, Environment, Error, ErrorKind, Value};
use serde::Serialize;
use tracing::debug;

use crate::core::pyrepr::{SCRIPT_SCHEMA_VERSION, to_python};
use crate::core::types::{QcProgram, TemplateKind};

/// Bundled templates, keyed by file name.
pub const BUNDLED_TEMPLATES: &[(&str, &str)] = &[
    (
        "ase_gauss_ts_search.py.tpl",
        include_str!("../../templates/ase_gauss_ts_search.py.tpl"),
    ),
    (
        "ase_gauss_ts_search_pcobfgs.py.tpl",
        include_str!("../../templates/ase_gauss_ts_search_pcobfgs.py.tpl"),
    ),
    (
        "ase_gauss_ts_end.py.tpl",
        include_str!("../../templates/ase_gauss_ts_end.py.tpl"),
    ),
    (
        "ase_nwchem_ts_search.py.tpl",
        include_str!("../../templates/ase_nwchem_ts_search.py.tpl"),
    ),
    (
        "ase_nwchem_ts_search_pcobfgs.py.tpl",
        include_str!("../../templates/ase_nwchem_ts_search_pcobfgs.py.tpl"),
    ),
    (
        "ase_nwchem_ts_end.py.tpl",
        include_str!("../../templates/ase_nwchem_ts_end.py.tpl"),
    ),
];

/// Values interpolated into a job script.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptContext {
    pub label: String,
    /// Calculator keyword arguments.
    pub kwargs: serde_json::Value,
    pub atom: Vec<String>,
    pub geom: Vec<[f64; 3]>,
    pub ppn: u32,
    /// Directory the script writes its result record to.
    pub results_dir: String,
    /// Program execution command; search templates only.
    pub qc_command: Option<String>,
    /// Working directory; search templates only.
    pub working_dir: Option<String>,
    /// Raw solver constraints for the PCOBFGS optimizer.
    pub fix: Option<serde_json::Value>,
    pub change: Option<serde_json::Value>,
    /// Force convergence threshold for the PCOBFGS optimizer.
    pub conv_crit: Option<f64>,
}

/// Renders a job-script template for a program and step kind.
pub trait TemplateRenderer {
    fn render(&self, program: QcProgram, kind: TemplateKind, ctx: &ScriptContext)
    -> Result<String>;
}

/// minijinja-backed renderer with bundled templates and an optional override
/// directory.
pub struct JinjaRenderer {
    env: Environment<'static>,
    template_dir: Option<PathBuf>,
}

impl JinjaRenderer {
    pub fn new(template_dir: Option<PathBuf>) -> Result<Self> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        env.add_filter("py", py_filter);
        for (name, source) in BUNDLED_TEMPLATES {
            env.add_template(name, source)
                .with_context(|| format!("parse bundled template {name}"))?;
        }
        Ok(Self { env, template_dir })
    }

    fn override_path(&self, name: &str) -> Option<PathBuf> {
        let path = self.template_dir.as_deref()?.join(name);
        path.is_file().then_some(path)
    }
}

impl TemplateRenderer for JinjaRenderer {
    fn render(
        &self,
        program: QcProgram,
        kind: TemplateKind,
        ctx: &ScriptContext,
    ) -> Result<String> {
        let name = kind.file_name(program);
        let context = Value::from_serialize(ScriptValues {
            schema_version: SCRIPT_SCHEMA_VERSION,
            script: ctx,
        });

        if let Some(path) = self.override_path(&name) {
            debug!(template = %path.display(), "rendering override template");
            let source = fs::read_to_string(&path)
                .with_context(|| format!("read template {}", path.display()))?;
            return self
                .env
                .render_str(&source, context)
                .with_context(|| format!("render template {}", path.display()));
        }

        let template = self
            .env
            .get_template(&name)
            .map_err(|_| anyhow!("unknown template {name}"))?;
        debug!(template = %name, "rendering bundled template");
        template
            .render(context)
            .with_context(|| format!("render template {name}"))
    }
}

#[derive(Serialize)]
struct ScriptValues<'a> {
    schema_version: u32,
    #[serde(flatten)]
    script: &'a ScriptContext,
}

fn py_filter(value: Value) -> Result<String, Error> {
    let json = serde_json::to_value(&value).map_err(|err| {
        Error::new(ErrorKind::InvalidOperation, "value has no Python form").with_source(err)
    })?;
    Ok(to_python(&json))
}

/// Copy the bundled templates into `dir`, keeping existing files unless
/// `force` is set. Returns the paths written.
pub fn install_templates(dir: &Path, force: bool) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let mut written = Vec::new();
    for (name, source) in BUNDLED_TEMPLATES {
        let path = dir.join(name);
        if path.exists() && !force {
            debug!(template = %path.display(), "keeping existing template");
            continue;
        }
        fs::write(&path, source).with_context(|| format!("write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
