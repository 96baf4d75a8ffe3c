//! Case descriptors: one solver invocation each.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CaseError;
use crate::options::{Options, Overrides};

/// Default config file name inside a case directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.cfg";

/// Everything needed to run the solver once.
///
/// Built with [`CaseDescriptor::new`] and the `with_*` builders, then treated
/// as read-only. The working directory belongs to this case alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDescriptor {
    name: String,
    working_dir: PathBuf,
    config_file: String,
    log_file: String,
    overrides: Overrides,
}

impl CaseDescriptor {
    /// New case with `config.cfg` and `<name>_log.txt` inside `working_dir`.
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let log_file = format!("{name}_log.txt");
        Self {
            name,
            working_dir: working_dir.into(),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            log_file,
            overrides: Overrides::new(),
        }
    }

    pub fn with_config_file(mut self, config_file: impl Into<String>) -> Self {
        self.config_file = config_file.into();
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<String>) -> Self {
        self.log_file = log_file.into();
        self
    }

    pub fn with_override(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.overrides.insert(key, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    /// Config file name, relative to the working directory.
    pub fn config_file_name(&self) -> &str {
        &self.config_file
    }

    /// Log file name, relative to the working directory.
    pub fn log_destination(&self) -> &str {
        &self.log_file
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn config_path(&self) -> PathBuf {
        self.working_dir.join(&self.config_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.working_dir.join(&self.log_file)
    }

    /// Concrete options for this case: `baseline` with this case's overrides.
    pub fn prepare_overrides(&self, baseline: &Options) -> Result<Options, CaseError> {
        self.overrides.apply(baseline).map_err(|e| match e {
            CaseError::Configuration { reason } => CaseError::Configuration {
                reason: format!("case {}: {reason}", self.name),
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let case = CaseDescriptor::new("base", "/data/base");
        assert_eq!(case.name(), "base");
        assert_eq!(case.config_file_name(), "config.cfg");
        assert_eq!(case.log_destination(), "base_log.txt");
        assert_eq!(case.config_path(), PathBuf::from("/data/base/config.cfg"));
        assert_eq!(case.log_path(), PathBuf::from("/data/base/base_log.txt"));
        assert!(case.overrides().is_empty());
    }

    #[test]
    fn test_prepare_overrides_merges() {
        let baseline = Options::parse("LIMITER_COEFF= 0.3\nEXT_ITER= 100\n").unwrap();
        let case = CaseDescriptor::new("limitcoeff0.1", "/tmp/x").with_override("LIMITER_COEFF", "0.1");
        let concrete = case.prepare_overrides(&baseline).unwrap();
        assert_eq!(concrete.get("LIMITER_COEFF"), Some("0.1"));
        assert_eq!(concrete.get("EXT_ITER"), Some("100"));
    }

    #[test]
    fn test_prepare_overrides_names_the_case() {
        let baseline = Options::parse("EXT_ITER= 100\n").unwrap();
        let case = CaseDescriptor::new("bad", "/tmp/x").with_override("MISSING", "1");
        let err = case.prepare_overrides(&baseline).unwrap_err();
        assert!(err.to_string().contains("case bad"));
    }
}
