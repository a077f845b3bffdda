//! Sanitized-binary execution and diagnostic classification.
//!
//! Runs a sanitizer-instrumented binary in a scoped subprocess, captures
//! its output, and classifies the outcome. Marker patterns are
//! configuration, not hard-coded, so new sanitizers extend the set without
//! touching the classifier.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{ProbeError, ProbeResult};
use crate::toolchain::{run_captured, CompilationArtifact};

/// Diagnostic text fragments that identify sanitizer reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkerSet {
    /// Substrings matched against each output line.
    pub markers: Vec<String>,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self {
            markers: vec![
                "ERROR: AddressSanitizer".to_string(),
                "ERROR: LeakSanitizer".to_string(),
                "heap-buffer-overflow".to_string(),
                "stack-buffer-overflow".to_string(),
                "heap-use-after-free".to_string(),
                "runtime error:".to_string(),
                "SUMMARY: UndefinedBehaviorSanitizer".to_string(),
            ],
        }
    }
}

impl MarkerSet {
    /// First output line containing any marker, verbatim.
    pub fn first_match<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.lines()
            .find(|line| self.markers.iter().any(|m| line.contains(m.as_str())))
    }
}

/// Outcome classification for one sanitized run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Exit 0 and no sanitizer marker in the output.
    Clean,

    /// Non-zero exit with no sanitizer marker.
    RuntimeCrash,

    /// A sanitizer reported a violation.
    SanitizerError,
}

/// Result of running one sanitized binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticReport {
    /// Process exit code (-1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr (sanitizer reports land here).
    pub stderr: String,

    /// Classified outcome.
    pub classification: Classification,

    /// The matched marker line, verbatim (SanitizerError only).
    pub marker_line: Option<String>,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Executes sanitized binaries and classifies their diagnostics.
pub struct SanitizerRunner {
    timeout: Duration,
    markers: MarkerSet,
}

impl SanitizerRunner {
    pub fn new(timeout: Duration, markers: MarkerSet) -> Self {
        Self { timeout, markers }
    }

    /// Run a binary artifact and classify the result.
    ///
    /// Timeouts surface as [`ProbeError::Timeout`]; the child is
    /// force-terminated, never orphaned.
    pub async fn run(&self, artifact: &CompilationArtifact) -> ProbeResult<DiagnosticReport> {
        let binary = artifact
            .binary_path()
            .ok_or(ProbeError::ArtifactMismatch { expected: "binary" })?;

        let start = Instant::now();
        let output = run_captured(&binary.display().to_string(), &[], self.timeout).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (classification, marker) =
            classify(&self.markers, output.exit_code, &output.stdout, &output.stderr);
        let marker_line = marker.map(|l| l.to_string());

        debug!(
            exit_code = output.exit_code,
            classification = ?classification,
            duration_ms,
            "sanitized run finished"
        );

        Ok(DiagnosticReport {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            classification,
            marker_line,
            duration_ms,
        })
    }
}

/// Classification policy, applied to combined stdout/stderr.
///
/// A marker always wins: sanitizers can be configured to rewrite the exit
/// code, so Clean requires both exit 0 and marker-free output.
pub fn classify<'a>(
    markers: &MarkerSet,
    exit_code: i32,
    stdout: &'a str,
    stderr: &'a str,
) -> (Classification, Option<&'a str>) {
    if let Some(line) = markers.first_match(stderr).or_else(|| markers.first_match(stdout)) {
        return (Classification::SanitizerError, Some(line));
    }
    if exit_code == 0 {
        (Classification::Clean, None)
    } else {
        (Classification::RuntimeCrash, None)
    }
}
