//! Job-script files (`<instance_name>.py`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

pub fn script_path(workdir: &Path, instance_name: &str) -> PathBuf {
    workdir.join(format!("{instance_name}.py"))
}

/// Write the rendered script, replacing any previous one for the instance.
pub fn write_job_script(workdir: &Path, instance_name: &str, contents: &str) -> Result<PathBuf> {
    let path = script_path(workdir, instance_name);
    fs::write(&path, contents).with_context(|| format!("write job script {}", path.display()))?;
    debug!(path = %path.display(), bytes = contents.len(), "job script written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_previous_script() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_job_script(temp.path(), "rxn001", "first").expect("write");
        let path = write_job_script(temp.path(), "rxn001", "second").expect("write");
        assert_eq!(path, temp.path().join("rxn001.py"));
        assert_eq!(fs::read_to_string(path).expect("read"), "second");
    }

    #[test]
    fn missing_workdir_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = write_job_script(&temp.path().join("missing"), "rxn001", "x").unwrap_err();
        assert!(err.to_string().contains("write job script"));
    }
}
