//! Sweep configuration: where inputs live, where results go, how to run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SweepError, SweepResult};
use crate::runner::{ConcurrencyPolicy, ProcessLauncher};

pub const DEFAULT_STUDY: &str = "scitec_2014/su2paper_sst";
pub const DEFAULT_BASELINE_FILE: &str = "base_flatplate_config.cfg";
pub const DEFAULT_SOLVER: &str = "SU2_CFD";

/// Resolved configuration for one program run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Directory holding the baseline config and meshes.
    pub data_dir: PathBuf,
    /// Directory variant cases are written under.
    pub results_dir: PathBuf,
    /// Baseline config file name inside `data_dir`.
    pub baseline_file: String,
    /// Solver binary, looked up on `PATH` when not absolute.
    pub solver: PathBuf,
    /// Arguments passed before the config file.
    #[serde(default)]
    pub solver_args: Vec<String>,
    pub policy: ConcurrencyPolicy,
    /// Per-case wall-clock limit. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl SweepConfig {
    /// Default layout under `root`:
    /// `<root>/data/<study>` for inputs and `<root>/results/<study>` for output.
    ///
    /// `root` must be given explicitly; a missing root is a configuration error.
    pub fn from_root(root: Option<&Path>, study: &str) -> SweepResult<Self> {
        let root = root.ok_or_else(|| {
            SweepError::Configuration(
                "no root directory configured (pass --root or set CFDSWEEP_ROOT)".to_string(),
            )
        })?;
        Ok(Self {
            data_dir: root.join("data").join(study),
            results_dir: root.join("results").join(study),
            baseline_file: DEFAULT_BASELINE_FILE.to_string(),
            solver: PathBuf::from(DEFAULT_SOLVER),
            solver_args: Vec::new(),
            policy: ConcurrencyPolicy::default(),
            timeout_secs: None,
        })
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.data_dir.join(&self.baseline_file)
    }

    /// Fail fast on settings that would only surface mid-batch.
    pub fn validate(&self) -> SweepResult<()> {
        if let ConcurrencyPolicy::BoundedParallel { max_workers: 0 } = self.policy {
            return Err(SweepError::Configuration(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(SweepError::Configuration(
                "timeout must be positive when set".to_string(),
            ));
        }
        if !self.data_dir.is_dir() {
            return Err(SweepError::Configuration(format!(
                "data directory {} does not exist",
                self.data_dir.display()
            )));
        }
        if !self.baseline_path().is_file() {
            return Err(SweepError::Configuration(format!(
                "baseline config {} does not exist",
                self.baseline_path().display()
            )));
        }
        if self.solver.as_os_str().is_empty() {
            return Err(SweepError::Configuration("solver binary is empty".to_string()));
        }
        Ok(())
    }

    pub fn launcher(&self) -> ProcessLauncher {
        let launcher = ProcessLauncher::new(&self.solver).with_args(self.solver_args.clone());
        match self.timeout_secs {
            Some(secs) => launcher.with_timeout(Duration::from_secs(secs)),
            None => launcher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_root_is_configuration_error() {
        let err = SweepConfig::from_root(None, DEFAULT_STUDY).unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
        assert!(err.to_string().contains("CFDSWEEP_ROOT"));
    }

    #[test]
    fn test_default_layout() {
        let config = SweepConfig::from_root(Some(Path::new("/srv/cfd")), DEFAULT_STUDY).unwrap();
        assert_eq!(
            config.data_dir,
            PathBuf::from("/srv/cfd/data/scitec_2014/su2paper_sst")
        );
        assert_eq!(
            config.results_dir,
            PathBuf::from("/srv/cfd/results/scitec_2014/su2paper_sst")
        );
        assert_eq!(
            config.baseline_path(),
            PathBuf::from("/srv/cfd/data/scitec_2014/su2paper_sst/base_flatplate_config.cfg")
        );
        assert_eq!(config.solver, PathBuf::from("SU2_CFD"));
    }

    #[test]
    fn test_validate_checks_inputs() {
        let root = TempDir::new().unwrap();
        let mut config = SweepConfig::from_root(Some(root.path()), "study").unwrap();
        assert!(config.validate().is_err(), "missing data dir");

        std::fs::create_dir_all(&config.data_dir).unwrap();
        assert!(config.validate().is_err(), "missing baseline");

        std::fs::write(config.baseline_path(), "EXT_ITER= 1\n").unwrap();
        config.validate().unwrap();

        config.policy = ConcurrencyPolicy::BoundedParallel { max_workers: 0 };
        assert!(config.validate().is_err());

        config.policy = ConcurrencyPolicy::Serial;
        config.timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }
}
