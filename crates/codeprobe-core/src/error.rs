//! Error taxonomy for the probe harness.

/// Errors produced while driving the toolchain and classifying samples.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("toolchain exited with code {exit_code}: {stderr}")]
    Compile { exit_code: i32, stderr: String },

    #[error("subprocess timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("assembly analysis failed: {0}")]
    Analysis(String),

    #[error("binary audit failed: {0}")]
    Audit(String),

    #[error("artifact mismatch: expected a {expected} artifact")]
    ArtifactMismatch { expected: &'static str },

    #[error("unsupported source language: {0}")]
    UnsupportedLanguage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Stable short name used in report entries and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Compile { .. } => "compile_error",
            ProbeError::Timeout { .. } => "timeout",
            ProbeError::Analysis(_) => "analysis_error",
            ProbeError::Audit(_) => "audit_error",
            ProbeError::ArtifactMismatch { .. } => "artifact_mismatch",
            ProbeError::UnsupportedLanguage(_) => "unsupported_language",
            ProbeError::Io(_) => "io_error",
        }
    }
}

/// Result type for probe operations.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
