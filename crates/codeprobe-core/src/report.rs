//! Structured per-sample and harness-level reports.
//!
//! Every pipeline run produces exactly one [`SampleReport`] per sample —
//! including every failure path — and one [`HarnessReport`] roll-up whose
//! conformance gate drives the CLI exit status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::assembly::VectorizationVerdict;
use crate::audit::AuditReport;
use crate::sample::{Goal, Language, SampleFile};
use crate::sanitizer::{Classification, DiagnosticReport};

/// What happened to one sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleOutcome {
    /// Sanitizer suite ran to completion.
    Sanitizer { report: DiagnosticReport },

    /// Assembly analysis ran to completion.
    Vectorization { verdict: VectorizationVerdict },

    /// Hardening audit ran to completion.
    Audit { report: AuditReport },

    /// The sample declared no recognized goal; nothing was executed.
    Unspecified,

    /// A pipeline stage failed; the sample and error kind are reported,
    /// never swallowed.
    Error { error_kind: String, message: String },
}

/// Report entry for one sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleReport {
    /// Sample path as loaded.
    pub path: PathBuf,

    /// Source language.
    pub language: Language,

    /// Goal declared by the sample header.
    pub goal: Goal,

    /// Lineage digest of the artifact, when compilation succeeded.
    pub lineage_digest: Option<String>,

    /// Pipeline outcome.
    pub outcome: SampleOutcome,

    /// Wall-clock duration of the whole pipeline for this sample.
    pub duration_ms: u64,

    /// Completion timestamp.
    pub finished_at: DateTime<Utc>,
}

impl SampleReport {
    /// Whether the sample behaved per its declared goal.
    ///
    /// The fixtures exist to demonstrate a defect, so conformance means the
    /// probe surfaced it: the sanitizer suite must classify SanitizerError,
    /// and the assembly probe must find the loop unvectorized. An audit
    /// conforms by completing; unspecified and errored samples never
    /// conform.
    pub fn conforming(&self) -> bool {
        match (&self.goal, &self.outcome) {
            (Goal::SanitizerSuite, SampleOutcome::Sanitizer { report }) => {
                report.classification == Classification::SanitizerError
            }
            (Goal::AssemblyEssence, SampleOutcome::Vectorization { verdict }) => {
                !verdict.vectorized
            }
            (Goal::BinaryAudit, SampleOutcome::Audit { .. }) => true,
            _ => false,
        }
    }

    /// One-line summary for terminal output.
    pub fn summary_line(&self) -> String {
        let status = if self.conforming() { "ok  " } else { "FAIL" };
        let detail = match &self.outcome {
            SampleOutcome::Sanitizer { report } => match &report.marker_line {
                Some(line) => format!("sanitizer: {}", line.trim()),
                None => format!("sanitizer: {:?} (exit {})", report.classification, report.exit_code),
            },
            SampleOutcome::Vectorization { verdict } => format!(
                "vectorized={} ({} packed ops over {} instructions)",
                verdict.vectorized,
                verdict.evidence.len(),
                verdict.scanned_instructions
            ),
            SampleOutcome::Audit { report } => {
                format!("audit: pie={:?} nx={:?}", report.pie, report.nx)
            }
            SampleOutcome::Unspecified => "no recognized goal header".to_string(),
            SampleOutcome::Error { error_kind, message } => {
                format!("{}: {}", error_kind, message)
            }
        };
        format!(
            "[{}] {:<40} {:<17} {}",
            status,
            self.path.display().to_string(),
            self.goal.name(),
            detail
        )
    }
}

/// Roll-up of one harness run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessReport {
    /// Unique id for this run.
    pub run_id: String,

    /// Per-sample reports, in input order.
    pub samples: Vec<SampleReport>,

    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,
}

impl HarnessReport {
    /// Number of conforming samples.
    pub fn conforming_count(&self) -> usize {
        self.samples.iter().filter(|s| s.conforming()).count()
    }

    /// Number of non-conforming samples.
    pub fn nonconforming_count(&self) -> usize {
        self.samples.len() - self.conforming_count()
    }

    /// Gate: every sample behaved per its declared goal.
    pub fn all_conforming(&self) -> bool {
        self.samples.iter().all(|s| s.conforming())
    }

    /// Render the terminal (non-JSON) report.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "run {} — {}/{} samples conforming ({} ms)\n",
            self.run_id,
            self.conforming_count(),
            self.samples.len(),
            self.duration_ms
        );
        for sample in &self.samples {
            out.push_str("  ");
            out.push_str(&sample.summary_line());
            out.push('\n');
        }
        out
    }
}

/// Build a report entry for a sample whose pipeline failed.
pub fn error_report(
    sample: &SampleFile,
    error_kind: &str,
    message: String,
    duration_ms: u64,
) -> SampleReport {
    SampleReport {
        path: sample.path.clone(),
        language: sample.language,
        goal: sample.goal,
        lineage_digest: None,
        outcome: SampleOutcome::Error {
            error_kind: error_kind.to_string(),
            message,
        },
        duration_ms,
        finished_at: Utc::now(),
    }
}
