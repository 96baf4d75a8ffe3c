//! Batch execution under a concurrency policy.
//!
//! The runner launches one solver process per ready case and returns a
//! [`BatchReport`] whose `outcomes[i]` always belongs to `batch.entries()[i]`,
//! whatever order the cases finished in. A failing case only ever fills its
//! own slot. `Err` from [`BatchRunner::run`] means the runner itself broke
//! (a worker task panicked or a slot went missing), never that a case failed.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::batch::{Batch, BatchEntry};
use crate::case::CaseDescriptor;
use crate::error::{CaseError, SweepError, SweepResult};

/// Lines of the log file kept in a failure excerpt.
const EXCERPT_LINES: usize = 20;

/// How cases are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// One case at a time, in submission order.
    Serial,
    /// At most `max_workers` solver processes in flight.
    BoundedParallel { max_workers: usize },
}

impl ConcurrencyPolicy {
    pub fn bounded(max_workers: usize) -> SweepResult<Self> {
        if max_workers == 0 {
            return Err(SweepError::Configuration(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(Self::BoundedParallel { max_workers })
    }

    pub fn max_in_flight(&self) -> usize {
        match self {
            Self::Serial => 1,
            Self::BoundedParallel { max_workers } => *max_workers,
        }
    }
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self::BoundedParallel { max_workers: 4 }
    }
}

/// A solver run that exited zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRun {
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Result slot for one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    /// Position of the case in the submitted batch.
    pub index: usize,
    pub name: String,
    pub result: Result<CaseRun, CaseError>,
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&CaseError> {
        self.result.as_ref().err()
    }
}

/// Index-aligned outcomes of a whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub policy: ConcurrencyPolicy,
    pub outcomes: Vec<CaseOutcome>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }

    pub fn all_passed(&self) -> bool {
        self.failed_count() == 0
    }

    /// Process exit status for the whole run: 0 only if every case succeeded.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

/// Starts the solver for one case and waits for it.
///
/// The runner has already checked the case's directory and config file.
#[async_trait]
pub trait SolverLauncher: Send + Sync {
    async fn launch(&self, case: &CaseDescriptor) -> Result<CaseRun, CaseError>;
}

/// Launches the solver binary as a child process:
/// `<solver> [args..] <config-file>` in the case directory, output to the case log.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    solver: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ProcessLauncher {
    pub fn new(solver: impl Into<PathBuf>) -> Self {
        Self {
            solver: solver.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Arguments placed before the config file, e.g. for an `mpirun` wrapper.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kill the solver and fail the case if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn solver(&self) -> &std::path::Path {
        &self.solver
    }
}

#[async_trait]
impl SolverLauncher for ProcessLauncher {
    async fn launch(&self, case: &CaseDescriptor) -> Result<CaseRun, CaseError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let log_path = case.log_path();

        let mut child = {
            let log = tokio::fs::File::create(&log_path)
                .await
                .map_err(|e| {
                    CaseError::preparation(format!("cannot open log {}: {e}", log_path.display()))
                })?
                .into_std()
                .await;
            let err_log = log.try_clone().map_err(|e| {
                CaseError::preparation(format!("cannot open log {}: {e}", log_path.display()))
            })?;

            // The command owns both log handles and closes them when dropped at
            // the end of this block; the child keeps its own copies.
            Command::new(&self.solver)
                .args(&self.args)
                .arg(case.config_file_name())
                .current_dir(case.working_directory())
                .stdin(Stdio::null())
                .stdout(Stdio::from(log))
                .stderr(Stdio::from(err_log))
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| CaseError::SolverExecution {
                    exit_code: None,
                    excerpt: format!("failed to start {}: {e}", self.solver.display()),
                })?
        };

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(case = %case.name(), error = %e, "failed to kill timed out solver");
                    }
                    return Err(CaseError::Timeout {
                        limit_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => child.wait().await,
        };
        let status = waited.map_err(|e| CaseError::SolverExecution {
            exit_code: None,
            excerpt: format!("failed waiting for solver: {e}"),
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        if status.success() {
            return Ok(CaseRun {
                exit_code: 0,
                started_at,
                finished_at: Utc::now(),
                duration_ms,
            });
        }

        Err(CaseError::SolverExecution {
            exit_code: status.code(),
            excerpt: log_excerpt(&log_path).await,
        })
    }
}

/// Last lines of a log file, or a note when it cannot be read.
async fn log_excerpt(path: &std::path::Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            let lines: Vec<&str> = text.lines().collect();
            let tail = &lines[lines.len().saturating_sub(EXCERPT_LINES)..];
            tail.join("\n")
        }
        Err(e) => format!("log unavailable: {e}"),
    }
}

/// Runs a [`Batch`] under a [`ConcurrencyPolicy`].
pub struct BatchRunner {
    policy: ConcurrencyPolicy,
    launcher: Arc<dyn SolverLauncher>,
}

impl BatchRunner {
    pub fn new(policy: ConcurrencyPolicy, launcher: Arc<dyn SolverLauncher>) -> Self {
        Self { policy, launcher }
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    /// Run every case and return one outcome per case, index-aligned.
    #[instrument(skip(self, batch), fields(cases = batch.len(), policy = ?self.policy))]
    pub async fn run(&self, batch: &Batch) -> SweepResult<BatchReport> {
        let batch_id = Uuid::new_v4();
        let start = Instant::now();
        info!(%batch_id, "starting batch");

        let outcomes = match self.policy {
            ConcurrencyPolicy::Serial => self.run_serial(batch).await?,
            ConcurrencyPolicy::BoundedParallel { max_workers } => {
                self.run_bounded(batch, max_workers).await?
            }
        };

        if outcomes.len() != batch.len() {
            return Err(SweepError::Aggregation {
                detail: format!(
                    "{} outcomes for {} submitted cases",
                    outcomes.len(),
                    batch.len()
                ),
            });
        }

        let report = BatchReport {
            batch_id,
            policy: self.policy,
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            %batch_id,
            passed = report.passed_count(),
            failed = report.failed_count(),
            duration_ms = report.duration_ms,
            "batch finished"
        );
        Ok(report)
    }

    async fn run_serial(&self, batch: &Batch) -> SweepResult<Vec<CaseOutcome>> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for (index, entry) in batch.entries().iter().enumerate() {
            // Each case gets its own task so a panicking launcher surfaces as
            // a JoinError here, same as under the bounded policy.
            let launcher = Arc::clone(&self.launcher);
            let entry = entry.clone();
            let joined = tokio::spawn(async move {
                let result = run_case(launcher.as_ref(), &entry).await;
                outcome(index, &entry, result)
            })
            .await;
            outcomes.push(joined.map_err(|e| SweepError::Aggregation {
                detail: format!("worker task failed: {e}"),
            })?);
        }
        Ok(outcomes)
    }

    async fn run_bounded(
        &self,
        batch: &Batch,
        max_workers: usize,
    ) -> SweepResult<Vec<CaseOutcome>> {
        if max_workers == 0 {
            return Err(SweepError::Configuration(
                "max_workers must be at least 1".to_string(),
            ));
        }

        // Permits are taken here, in submission order, before each task is
        // spawned, so queued cases are admitted first-in first-out.
        let pool = Arc::new(Semaphore::new(max_workers));
        let mut tasks = Vec::with_capacity(batch.len());

        for (index, entry) in batch.entries().iter().enumerate() {
            let permit = Arc::clone(&pool)
                .acquire_owned()
                .await
                .map_err(|e| SweepError::Aggregation {
                    detail: format!("worker pool closed: {e}"),
                })?;
            let launcher = Arc::clone(&self.launcher);
            let entry = entry.clone();

            tasks.push(tokio::spawn(async move {
                let result = run_case(launcher.as_ref(), &entry).await;
                drop(permit);
                outcome(index, &entry, result)
            }));
        }

        let mut slots: Vec<Option<CaseOutcome>> = (0..batch.len()).map(|_| None).collect();
        for joined in futures::future::join_all(tasks).await {
            let outcome = joined.map_err(|e| SweepError::Aggregation {
                detail: format!("worker task failed: {e}"),
            })?;
            let index = outcome.index;
            match slots.get_mut(index) {
                Some(slot) if slot.is_none() => *slot = Some(outcome),
                _ => {
                    return Err(SweepError::Aggregation {
                        detail: format!("result slot {index} filled twice or out of range"),
                    })
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| SweepError::Aggregation {
                    detail: format!("no result for case at index {index}"),
                })
            })
            .collect()
    }
}

fn outcome(index: usize, entry: &BatchEntry, result: Result<CaseRun, CaseError>) -> CaseOutcome {
    CaseOutcome {
        index,
        name: entry.case.name().to_string(),
        result,
    }
}

/// Execute one case: skip if preparation failed, check its directory, launch.
async fn run_case(
    launcher: &dyn SolverLauncher,
    entry: &BatchEntry,
) -> Result<CaseRun, CaseError> {
    let case = &entry.case;
    if let Err(e) = &entry.preparation {
        return Err(e.clone());
    }

    let dir = case.working_directory();
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(CaseError::preparation(format!(
                "{} is not a directory",
                dir.display()
            )))
        }
        Err(e) => {
            return Err(CaseError::preparation(format!(
                "cannot enter {}: {e}",
                dir.display()
            )))
        }
    }
    if tokio::fs::metadata(case.config_path()).await.is_err() {
        return Err(CaseError::preparation(format!(
            "config file {} is missing",
            case.config_path().display()
        )));
    }

    debug!(case = %case.name(), dir = %dir.display(), "launching solver");
    let result = launcher.launch(case).await;
    match &result {
        Ok(run) => debug!(case = %case.name(), duration_ms = run.duration_ms, "case succeeded"),
        Err(e) => warn!(case = %case.name(), error = %e, "case failed"),
    }
    result
}
