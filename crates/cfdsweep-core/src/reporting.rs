//! Human and machine-readable batch summaries.
//!
//! Lines always follow submission order, even though cases may finish in any
//! order under a parallel policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::batch::Batch;
use crate::error::{SweepError, SweepResult};
use crate::finalize::FinalizeOutcome;
use crate::runner::BatchReport;

/// Status of one case as reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Succeeded,
    Failed,
}

/// One case in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReportLine {
    pub index: usize,
    pub name: String,
    pub status: CaseStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub options_digest: Option<String>,
}

/// Whole-run report artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReportArtifact {
    pub batch_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub variation: String,
    pub total_cases: usize,
    pub passed_cases: usize,
    pub cases: Vec<CaseReportLine>,
}

/// Build per-case lines from a batch and its report.
pub fn case_lines(batch: &Batch, report: &BatchReport) -> SweepResult<Vec<CaseReportLine>> {
    if batch.len() != report.outcomes.len() {
        return Err(SweepError::Aggregation {
            detail: format!(
                "report has {} outcomes for {} cases",
                report.outcomes.len(),
                batch.len()
            ),
        });
    }

    Ok(batch
        .entries()
        .iter()
        .zip(&report.outcomes)
        .enumerate()
        .map(|(index, (entry, outcome))| match &outcome.result {
            Ok(run) => CaseReportLine {
                index,
                name: entry.case.name().to_string(),
                status: CaseStatus::Succeeded,
                exit_code: Some(run.exit_code),
                duration_ms: Some(run.duration_ms),
                error: None,
                options_digest: entry.options_digest.clone(),
            },
            Err(e) => CaseReportLine {
                index,
                name: entry.case.name().to_string(),
                status: CaseStatus::Failed,
                exit_code: e.exit_code(),
                duration_ms: None,
                error: Some(e.to_string()),
                options_digest: entry.options_digest.clone(),
            },
        })
        .collect())
}

pub fn build_artifact(
    variation: &str,
    batch: &Batch,
    report: &BatchReport,
) -> SweepResult<SweepReportArtifact> {
    let cases = case_lines(batch, report)?;
    Ok(SweepReportArtifact {
        batch_id: report.batch_id,
        generated_at: Utc::now(),
        variation: variation.to_string(),
        total_cases: cases.len(),
        passed_cases: report.passed_count(),
        cases,
    })
}

/// Text summary: one line per case, then a count.
pub fn render_summary(lines: &[CaseReportLine]) -> String {
    let mut out = String::new();
    for line in lines {
        match (&line.status, &line.error) {
            (CaseStatus::Failed, Some(error)) => {
                // Log excerpts span lines; keep one line per case.
                let error = error.lines().collect::<Vec<_>>().join(" | ");
                out.push_str(&format!("Error running case {}: {}\n", line.name, error));
            }
            (CaseStatus::Failed, None) => {
                out.push_str(&format!("Error running case {}\n", line.name));
            }
            (CaseStatus::Succeeded, _) => {
                out.push_str(&format!("Case {} ran successfully\n", line.name));
            }
        }
    }
    let passed = lines
        .iter()
        .filter(|l| l.status == CaseStatus::Succeeded)
        .count();
    out.push_str(&format!("{}/{} cases succeeded\n", passed, lines.len()));
    out
}

/// One JSON object per line, in submission order.
pub fn render_json_lines(lines: &[CaseReportLine]) -> SweepResult<String> {
    let mut out = String::new();
    for line in lines {
        out.push_str(&serde_json::to_string(line)?);
        out.push('\n');
    }
    Ok(out)
}

/// Finalize results, one line per case that did not promote cleanly.
pub fn render_finalize_notes(batch: &Batch, outcomes: &[FinalizeOutcome]) -> String {
    let mut out = String::new();
    for (case, outcome) in batch.cases().zip(outcomes) {
        match outcome {
            FinalizeOutcome::Promoted | FinalizeOutcome::AlreadyPromoted => {}
            FinalizeOutcome::MissingRestart { restart } => {
                out.push_str(&format!(
                    "Case {}: no restart file {} to promote\n",
                    case.name(),
                    restart.display()
                ));
            }
            FinalizeOutcome::Failed { reason } => {
                out.push_str(&format!("Case {}: finalize failed: {}\n", case.name(), reason));
            }
        }
    }
    out
}

/// Write the report artifact as pretty JSON.
pub fn write_report_json(path: &Path, artifact: &SweepReportArtifact) -> SweepResult<()> {
    let content = serde_json::to_string_pretty(artifact)?;
    std::fs::write(path, content)?;
    Ok(())
}
