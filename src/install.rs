use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::layout::CaseLayout;

const JOB_TEMPLATE: &str = include_str!("../templates/job.sh");
const RUN_TEMPLATE: &str = include_str!("../templates/run_clustering.sh");

/// Write `job.sh` and `run_clustering.sh` into the case directory.
///
/// `job.sh` gets `CASENAME`, `DATALOCATION` (the absolute data directory)
/// and `CLUSTERBIN` filled in; `run_clustering.sh` is copied as is.
pub fn install_scripts(
    layout: &CaseLayout,
    cluster_bin: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let case_dir = layout.case_dir();
    std::fs::create_dir_all(&case_dir).map_err(|e| PipelineError::io(&case_dir, e))?;
    let data_dir = std::path::absolute(layout.data_dir())
        .map_err(|e| PipelineError::io(layout.data_dir(), e))?;

    let job = JOB_TEMPLATE
        .replace("CASENAME", layout.casename())
        .replace("DATALOCATION", &data_dir.to_string_lossy())
        .replace("CLUSTERBIN", &cluster_bin.to_string_lossy());

    let mut written = Vec::new();
    for (name, content) in [("job.sh", job.as_str()), ("run_clustering.sh", RUN_TEMPLATE)] {
        let path = case_dir.join(name);
        std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
        make_executable(&path)?;
        log::debug!("installed {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), PipelineError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)
        .map_err(|e| PipelineError::io(path, e))?
        .permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms).map_err(|e| PipelineError::io(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), PipelineError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn job_script_is_filled_in() {
        let dir = TempDir::new().unwrap();
        let layout = CaseLayout::new(dir.path(), "sample");
        let written = install_scripts(&layout, Path::new("/opt/cluster/bin")).unwrap();
        assert_eq!(written.len(), 2);

        let job = std::fs::read_to_string(layout.case_dir().join("job.sh")).unwrap();
        assert!(!job.contains("CASENAME"));
        assert!(!job.contains("DATALOCATION"));
        assert!(!job.contains("CLUSTERBIN"));
        assert!(job.contains("BIN=/opt/cluster/bin"));
        assert!(job.contains("CASE=sample"));
        let data = format!("DATA={}", layout.data_dir().display());
        assert!(job.contains(&data));

        let run = std::fs::read_to_string(layout.case_dir().join("run_clustering.sh")).unwrap();
        assert_eq!(run, RUN_TEMPLATE);
    }
}
