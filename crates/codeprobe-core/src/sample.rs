//! Sample discovery and goal metadata.
//!
//! A sample is a single C or C++ source file whose leading comment block may
//! declare which probe should run on it, e.g.
//!
//! ```c
//! // Goal: run_sanitizer_suite
//! ```
//!
//! Samples with no recognized goal are still loaded and reported as
//! unspecified rather than rejected.

use crate::error::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source language of a sample, inferred from the file extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    C,
    Cpp,
}

impl Language {
    /// Infer the language from a path, or `None` for non-C/C++ files.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("c") => Some(Language::C),
            Some("cpp") | Some("cc") | Some("cxx") | Some("C") => Some(Language::Cpp),
            _ => None,
        }
    }

    /// Extension used when writing the source into a build directory.
    pub fn extension(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }
}

/// Probe selected by a sample's `Goal:` header.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    /// Compile with sanitizers, run, classify the diagnostics.
    SanitizerSuite,

    /// Compile to assembly, check the target function for vector code.
    AssemblyEssence,

    /// Compile with default flags, audit the binary's hardening.
    BinaryAudit,

    /// No recognized goal header; reported, never executed.
    Unspecified,
}

impl Goal {
    /// Match a goal declaration against the known probe names.
    ///
    /// The header text is free-form ("Test run_sanitizer_suite" is common),
    /// so matching is by substring.
    pub fn from_header(text: &str) -> Self {
        if text.contains("run_sanitizer_suite") {
            Goal::SanitizerSuite
        } else if text.contains("analyze_assembly_essence") {
            Goal::AssemblyEssence
        } else if text.contains("audit_binary_security") {
            Goal::BinaryAudit
        } else {
            Goal::Unspecified
        }
    }

    /// Stable name used in reports and log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Goal::SanitizerSuite => "sanitizer_suite",
            Goal::AssemblyEssence => "assembly_essence",
            Goal::BinaryAudit => "binary_audit",
            Goal::Unspecified => "unspecified",
        }
    }
}

/// A loaded sample: path, language, goal metadata, and source text.
///
/// Immutable once loaded; the pipeline never re-reads the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleFile {
    /// Path the sample was loaded from.
    pub path: PathBuf,

    /// Source language (from the extension).
    pub language: Language,

    /// Probe selected by the `Goal:` header.
    pub goal: Goal,

    /// Raw goal declaration, verbatim (None when absent).
    pub goal_text: Option<String>,

    /// Full source text.
    pub source: String,
}

impl SampleFile {
    /// Load a sample from disk.
    ///
    /// Fails with [`ProbeError::UnsupportedLanguage`] for files that are not
    /// C or C++ — directory scans filter those out before loading, so this
    /// only fires for explicit single-file invocations.
    pub fn load(path: &Path) -> ProbeResult<Self> {
        let language = Language::from_path(path).ok_or_else(|| {
            ProbeError::UnsupportedLanguage(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("<none>")
                    .to_string(),
            )
        })?;

        let source = std::fs::read_to_string(path)?;
        let goal_text = parse_goal_header(&source);
        let goal = goal_text
            .as_deref()
            .map(Goal::from_header)
            .unwrap_or(Goal::Unspecified);

        Ok(Self {
            path: path.to_path_buf(),
            language,
            goal,
            goal_text,
            source,
        })
    }

    /// File stem used to name build products.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sample")
            .to_string()
    }
}

/// Extract the `Goal:` declaration from a sample's leading comment block.
///
/// Only the comment lines before the first non-comment, non-blank line are
/// considered, so a `Goal:` mention buried in code does not select a probe.
pub fn parse_goal_header(source: &str) -> Option<String> {
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix("//") {
            let comment = comment.trim();
            if let Some(rest) = comment.strip_prefix("Goal:") {
                return Some(rest.trim().to_string());
            }
        } else {
            break;
        }
    }
    None
}

/// Scan a directory for C/C++ samples, sorted by path for determinism.
///
/// Non-source files are skipped silently; unreadable source files surface
/// as errors.
pub fn scan_directory(dir: &Path) -> ProbeResult<Vec<SampleFile>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && Language::from_path(&path).is_some() {
            paths.push(path);
        } else {
            debug!(path = %path.display(), "skipping non-sample entry");
        }
    }
    paths.sort();

    paths.iter().map(|p| SampleFile::load(p)).collect()
}
