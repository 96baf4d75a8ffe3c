//! Batch assembly: case validation and on-disk materialization.
//!
//! A [`Batch`] is what the runner consumes. Building one checks that cases do
//! not share names or working directories, then writes each case's concrete
//! config file into its own directory. A case whose overrides are invalid or
//! whose directory cannot be written keeps its error in its entry and is
//! skipped at run time; its siblings are unaffected.

use std::collections::HashSet;
use std::path::{Component, Path};

use serde::Serialize;
use tracing::{debug, warn};

use crate::case::CaseDescriptor;
use crate::error::{CaseError, SweepError, SweepResult};
use crate::options::Options;

/// One case plus the outcome of preparing it.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub case: CaseDescriptor,
    /// Digest of the concrete options, when they were computed here.
    pub options_digest: Option<String>,
    pub preparation: Result<(), CaseError>,
}

impl BatchEntry {
    pub fn is_ready(&self) -> bool {
        self.preparation.is_ok()
    }
}

/// Ordered set of cases for one program run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Batch {
    entries: Vec<BatchEntry>,
}

impl Batch {
    /// Merge each case's overrides onto `baseline` and write the result to
    /// `<working_dir>/<config_file>`, creating the directory if needed.
    pub fn prepare(baseline: &Options, cases: Vec<CaseDescriptor>) -> SweepResult<Self> {
        validate_ownership(&cases)?;
        let entries = cases
            .into_iter()
            .map(|case| materialize(baseline, case))
            .collect();
        Ok(Self { entries })
    }

    /// Wrap cases whose directories and config files already exist.
    pub fn from_materialized(cases: Vec<CaseDescriptor>) -> SweepResult<Self> {
        validate_ownership(&cases)?;
        let entries = cases
            .into_iter()
            .map(|case| BatchEntry {
                case,
                options_digest: None,
                preparation: Ok(()),
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn cases(&self) -> impl Iterator<Item = &CaseDescriptor> {
        self.entries.iter().map(|e| &e.case)
    }
}

fn materialize(baseline: &Options, case: CaseDescriptor) -> BatchEntry {
    let concrete = match case.prepare_overrides(baseline) {
        Ok(options) => options,
        Err(e) => {
            warn!(case = %case.name(), error = %e, "rejecting case before launch");
            return BatchEntry {
                case,
                options_digest: None,
                preparation: Err(e),
            };
        }
    };
    let digest = concrete.digest();

    let written = std::fs::create_dir_all(case.working_directory())
        .and_then(|_| std::fs::write(case.config_path(), concrete.render()));
    let preparation = match written {
        Ok(()) => {
            debug!(
                case = %case.name(),
                config = %case.config_path().display(),
                overrides = %case.overrides(),
                "materialized case"
            );
            Ok(())
        }
        Err(e) => {
            warn!(case = %case.name(), error = %e, "failed to materialize case");
            Err(CaseError::preparation(format!(
                "cannot write {}: {e}",
                case.config_path().display()
            )))
        }
    };

    BatchEntry {
        case,
        options_digest: Some(digest),
        preparation,
    }
}

/// Names and working directories must be unique, and file names must stay
/// inside the case's own directory.
fn validate_ownership(cases: &[CaseDescriptor]) -> SweepResult<()> {
    let mut names = HashSet::new();
    let mut dirs = HashSet::new();
    for case in cases {
        if case.name().is_empty() {
            return Err(SweepError::Configuration("case with empty name".to_string()));
        }
        if !names.insert(case.name()) {
            return Err(SweepError::Configuration(format!(
                "duplicate case name {}",
                case.name()
            )));
        }
        if !dirs.insert(case.working_directory()) {
            return Err(SweepError::Configuration(format!(
                "case {} shares working directory {}",
                case.name(),
                case.working_directory().display()
            )));
        }
        for file in [case.config_file_name(), case.log_destination()] {
            if !is_plain_file_name(file) {
                return Err(SweepError::Configuration(format!(
                    "case {}: {file:?} must be a plain file name",
                    case.name()
                )));
            }
        }
        if case.config_file_name() == case.log_destination() {
            return Err(SweepError::Configuration(format!(
                "case {}: config and log share {}",
                case.name(),
                case.config_file_name()
            )));
        }
    }
    Ok(())
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
