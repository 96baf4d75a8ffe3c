//! cfdsweep core library
//!
//! Parameter sweeps for an external CFD solver:
//! - [`options`]: baseline config parsing and sparse per-case overrides
//! - [`case`] / [`batch`]: case descriptors and on-disk materialization
//! - [`variation`]: registry of which parameter to vary
//! - [`runner`]: serial or bounded-parallel execution, one result per case
//! - [`finalize`]: promote restart files to solution files
//! - [`reporting`]: per-case summaries in submission order

pub mod batch;
pub mod case;
pub mod config;
pub mod error;
pub mod finalize;
pub mod options;
pub mod reporting;
pub mod runner;
pub mod telemetry;
pub mod variation;

pub use batch::{Batch, BatchEntry};
pub use case::CaseDescriptor;
pub use config::SweepConfig;
pub use error::{CaseError, SweepError, SweepResult};
pub use finalize::{finalize_batch, promote_restart_to_solution, FinalizeOutcome};
pub use options::{OptionDomain, Options, Overrides};
pub use reporting::{
    build_artifact, case_lines, render_finalize_notes, render_json_lines, render_summary,
    write_report_json, CaseReportLine, CaseStatus, SweepReportArtifact,
};
pub use runner::{
    BatchReport, BatchRunner, CaseOutcome, CaseRun, ConcurrencyPolicy, ProcessLauncher,
    SolverLauncher,
};
pub use telemetry::init_tracing;
pub use variation::{SweepContext, Variation, VariationFn, VariationRegistry};
