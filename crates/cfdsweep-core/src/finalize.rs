//! Post-run finalize step: promote a case's restart file to its solution file.
//!
//! Runs for every case regardless of how the case ended. Each call touches only
//! the case's own directory and does not look at sibling results. Running it
//! again leaves the solution file byte-identical.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use crate::batch::{Batch, BatchEntry};
use crate::options::Options;

pub const RESTART_KEY: &str = "RESTART_FLOW_FILENAME";
pub const SOLUTION_KEY: &str = "SOLUTION_FLOW_FILENAME";
pub const DEFAULT_RESTART_FILE: &str = "restart_flow.dat";
pub const DEFAULT_SOLUTION_FILE: &str = "solution_flow.dat";

/// What finalizing one case did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// Restart copied over the solution file.
    Promoted,
    /// Solution already held the restart's contents.
    AlreadyPromoted,
    /// The solver left no restart file behind.
    MissingRestart { restart: PathBuf },
    Failed { reason: String },
}

impl FinalizeOutcome {
    pub fn is_promoted(&self) -> bool {
        matches!(self, Self::Promoted | Self::AlreadyPromoted)
    }
}

/// Promote one case. File names come from the case's concrete options, with
/// the solver defaults when the options do not set them.
pub fn promote_restart_to_solution(entry: &BatchEntry, baseline: &Options) -> FinalizeOutcome {
    let case = &entry.case;
    let options = case
        .prepare_overrides(baseline)
        .unwrap_or_else(|_| baseline.clone());
    let dir = case.working_directory();
    let restart = dir.join(options.get(RESTART_KEY).unwrap_or(DEFAULT_RESTART_FILE));
    let solution = dir.join(options.get(SOLUTION_KEY).unwrap_or(DEFAULT_SOLUTION_FILE));

    let contents = match std::fs::read(&restart) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(case = %case.name(), restart = %restart.display(), "no restart file");
            return FinalizeOutcome::MissingRestart { restart };
        }
        Err(e) => {
            return FinalizeOutcome::Failed {
                reason: format!("cannot read {}: {e}", restart.display()),
            }
        }
    };

    if let Ok(existing) = std::fs::read(&solution) {
        if existing == contents {
            return FinalizeOutcome::AlreadyPromoted;
        }
    }

    // Write next to the target and rename so a reader never sees half a file.
    let staging = solution.with_extension("promoting");
    let written = std::fs::write(&staging, &contents).and_then(|_| std::fs::rename(&staging, &solution));
    match written {
        Ok(()) => {
            debug!(case = %case.name(), solution = %solution.display(), "promoted restart");
            FinalizeOutcome::Promoted
        }
        Err(e) => {
            let _ = std::fs::remove_file(&staging);
            warn!(case = %case.name(), error = %e, "finalize failed");
            FinalizeOutcome::Failed {
                reason: format!("cannot write {}: {e}", solution.display()),
            }
        }
    }
}

/// Finalize every case in the batch, index-aligned with its entries.
pub fn finalize_batch(batch: &Batch, baseline: &Options) -> Vec<FinalizeOutcome> {
    batch
        .entries()
        .iter()
        .map(|entry| promote_restart_to_solution(entry, baseline))
        .collect()
}
