//! Binary hardening audit via readelf.
//!
//! Compiled with default flags, a sample's binary is inspected for PIE and
//! NX. Checks that readelf output cannot decide are reported as `Unknown`,
//! never guessed.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{ProbeError, ProbeResult};
use crate::toolchain::{run_captured, CompilationArtifact};

/// Outcome of a single hardening check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Present,
    Missing,
    Unknown,
}

/// Hardening findings for one binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditReport {
    /// Position-independent executable (`Type: DYN` in the ELF header).
    pub pie: CheckStatus,

    /// Non-executable stack (`GNU_STACK` segment without the E flag).
    pub nx: CheckStatus,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Runs readelf against plain binary artifacts.
pub struct BinaryAuditor {
    readelf: String,
    timeout: Duration,
}

impl BinaryAuditor {
    pub fn new(readelf: impl Into<String>, timeout: Duration) -> Self {
        Self {
            readelf: readelf.into(),
            timeout,
        }
    }

    /// Audit a binary artifact.
    pub async fn audit(&self, artifact: &CompilationArtifact) -> ProbeResult<AuditReport> {
        let binary = artifact
            .binary_path()
            .ok_or(ProbeError::ArtifactMismatch { expected: "binary" })?;

        let start = Instant::now();
        let args = vec![
            "-l".to_string(),
            "-h".to_string(),
            binary.display().to_string(),
        ];
        let output = run_captured(&self.readelf, &args, self.timeout).await?;
        if output.exit_code != 0 {
            return Err(ProbeError::Audit(format!(
                "readelf exited with code {}: {}",
                output.exit_code, output.stderr
            )));
        }

        let mut report = parse_readelf(&output.stdout);
        report.duration_ms = start.elapsed().as_millis() as u64;
        debug!(pie = ?report.pie, nx = ?report.nx, "binary audit finished");
        Ok(report)
    }
}

/// Parse `readelf -l -h` output into hardening findings.
pub fn parse_readelf(output: &str) -> AuditReport {
    let mut pie = CheckStatus::Unknown;
    let mut nx = CheckStatus::Unknown;

    let mut lines = output.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();

        if trimmed.starts_with("Type:") {
            if trimmed.contains("DYN") {
                pie = CheckStatus::Present;
            } else if trimmed.contains("EXEC") {
                pie = CheckStatus::Missing;
            }
        }

        if trimmed.starts_with("GNU_STACK") {
            // Segment flags sit either on this line or on the wrapped
            // continuation line readelf emits for 64-bit headers.
            let mut flags_source = trimmed.to_string();
            if let Some(next) = lines.peek() {
                flags_source.push(' ');
                flags_source.push_str(next.trim());
            }
            nx = if stack_flags_executable(&flags_source) {
                CheckStatus::Missing
            } else {
                CheckStatus::Present
            };
        }
    }

    AuditReport {
        pie,
        nx,
        duration_ms: 0,
    }
}

/// Whether a GNU_STACK program-header line carries the E flag.
///
/// readelf prints segment flags as a short column like `RW` or `RWE`
/// (spaces stand in for absent flags), so any flags token containing `E`
/// means an executable stack.
fn stack_flags_executable(line: &str) -> bool {
    line.split_whitespace()
        .filter(|tok| tok.chars().all(|c| matches!(c, 'R' | 'W' | 'E')))
        .any(|tok| tok.contains('E'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const READELF_HARDENED: &str = "\
ELF Header:
  Class:                             ELF64
  Type:                              DYN (Position-Independent Executable file)
  Machine:                           Advanced Micro Devices X86-64

Program Headers:
  Type           Offset             VirtAddr           PhysAddr
  LOAD           0x0000000000000000 0x0000000000000000 0x0000000000000000
  GNU_STACK      0x0000000000000000 0x0000000000000000 0x0000000000000000
                 0x0000000000000000 0x0000000000000000  RW     0x10
";

    const READELF_SOFT: &str = "\
ELF Header:
  Type:                              EXEC (Executable file)

Program Headers:
  GNU_STACK      0x0000000000000000 0x0000000000000000 0x0000000000000000
                 0x0000000000000000 0x0000000000000000  RWE    0x10
";

    #[test]
    fn test_parse_hardened_binary() {
        let report = parse_readelf(READELF_HARDENED);
        assert_eq!(report.pie, CheckStatus::Present);
        assert_eq!(report.nx, CheckStatus::Present);
    }

    #[test]
    fn test_parse_soft_binary() {
        let report = parse_readelf(READELF_SOFT);
        assert_eq!(report.pie, CheckStatus::Missing);
        assert_eq!(report.nx, CheckStatus::Missing);
    }

    #[test]
    fn test_parse_empty_output_is_unknown() {
        let report = parse_readelf("");
        assert_eq!(report.pie, CheckStatus::Unknown);
        assert_eq!(report.nx, CheckStatus::Unknown);
    }
}
