//! Assembly-listing analysis for vectorization evidence.
//!
//! Extracts the instruction block of a target function from a textual
//! listing and scans it for packed/vector mnemonics. The mnemonic set is a
//! configuration input so the analyzer ports across instruction sets; the
//! scan itself is architecture-agnostic.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, ProbeResult};

/// Vector/packed-operation mnemonics for one architecture.
///
/// Matching is by case-insensitive prefix on the instruction text, which
/// covers operand-encoded vector forms like `add v0.4s, v1.4s, v2.4s`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MnemonicSet {
    /// Architecture name, for reports.
    pub arch: String,

    /// Instruction prefixes that indicate vector code.
    pub prefixes: Vec<String>,
}

impl MnemonicSet {
    /// Packed SSE/AVX mnemonics for x86-64 (Intel or AT&T syntax).
    pub fn x86_64() -> Self {
        let prefixes = [
            "addps", "addpd", "subps", "subpd", "mulps", "mulpd", "divps", "divpd",
            "paddb", "paddw", "paddd", "paddq", "psubb", "psubw", "psubd", "psubq",
            "pmulld", "pmullw", "pmuludq", "movdqa", "movdqu", "movups", "movupd",
            "vadd", "vsub", "vmul", "vdiv", "vfmadd", "vfmsub", "vpadd", "vpsub",
            "vpmull", "vmovdq", "vmovup", "vbroadcast", "vpbroadcast", "punpck",
            "pshuf", "vpshuf",
        ];
        Self {
            arch: "x86_64".to_string(),
            prefixes: prefixes.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// NEON/SVE-style mnemonics for aarch64.
    pub fn aarch64() -> Self {
        let prefixes = [
            "add v", "sub v", "mul v", "fadd v", "fsub v", "fmul v", "fdiv v",
            "fmla v", "fmls v", "ld1", "st1", "ld2", "st2", "ldp q", "stp q",
            "dup v", "movi v", "uzp", "zip", "whilelo",
        ];
        Self {
            arch: "aarch64".to_string(),
            prefixes: prefixes.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The prefix matching an instruction, if any.
    ///
    /// Whitespace is collapsed before matching, so tab-separated listings
    /// match space-containing prefixes like `add v`.
    pub fn matches(&self, instruction: &str) -> Option<&str> {
        let lowered = instruction
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        self.prefixes
            .iter()
            .find(|p| lowered.starts_with(p.as_str()))
            .map(|p| p.as_str())
    }
}

/// Result of scanning one function block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VectorizationVerdict {
    /// Function the block was extracted for.
    pub function: String,

    /// Whether any vector mnemonic was present in the block.
    pub vectorized: bool,

    /// Matched instruction lines, in listing order, verbatim (trimmed).
    pub evidence: Vec<String>,

    /// Configured prefixes that never matched.
    pub unmatched_patterns: Vec<String>,

    /// Number of instructions scanned.
    pub scanned_instructions: usize,
}

/// Scans extracted function blocks for vector code.
pub struct AssemblyAnalyzer {
    mnemonics: MnemonicSet,
    label_re: Regex,
}

impl AssemblyAnalyzer {
    pub fn new(mnemonics: MnemonicSet) -> Self {
        Self {
            mnemonics,
            // A label is an identifier at the start of a line, ending in ':'.
            label_re: Regex::new(r"^\s*([A-Za-z_.$][A-Za-z0-9_.$@]*):").expect("static regex"),
        }
    }

    /// Analyze the target function's block in a listing.
    ///
    /// Fails with [`ProbeError::Analysis`] when the label is absent (the
    /// symbol may be ablated under aggressive optimization or inlining) or
    /// appears more than once.
    pub fn analyze(&self, listing: &str, function: &str) -> ProbeResult<VectorizationVerdict> {
        let block = self.extract_block(listing, function)?;

        let mut evidence = Vec::new();
        let mut matched_prefixes = std::collections::HashSet::new();
        let mut scanned = 0usize;

        for instruction in &block {
            scanned += 1;
            if let Some(prefix) = self.mnemonics.matches(instruction) {
                matched_prefixes.insert(prefix.to_string());
                evidence.push(instruction.trim().to_string());
            }
        }

        let unmatched_patterns = self
            .mnemonics
            .prefixes
            .iter()
            .filter(|p| !matched_prefixes.contains(p.as_str()))
            .cloned()
            .collect();

        Ok(VectorizationVerdict {
            function: function.to_string(),
            vectorized: !evidence.is_empty(),
            evidence,
            unmatched_patterns,
            scanned_instructions: scanned,
        })
    }

    /// First non-local label in the listing, used when a sample's goal
    /// header names no function.
    pub fn first_function(&self, listing: &str) -> ProbeResult<String> {
        for line in listing.lines() {
            if let Some(caps) = self.label_re.captures(line) {
                let name = &caps[1];
                if !name.starts_with('.') {
                    return Ok(name.to_string());
                }
            }
        }
        Err(ProbeError::Analysis(
            "no function label found in listing".to_string(),
        ))
    }

    /// Instruction lines from the function's label to the next non-local
    /// label or end of listing. Directives and local labels (`.L...`) stay
    /// inside the block; blank lines and comments are dropped.
    fn extract_block(&self, listing: &str, function: &str) -> ProbeResult<Vec<String>> {
        let mut block = Vec::new();
        let mut inside = false;
        let mut label_count = 0usize;

        for line in listing.lines() {
            if let Some(caps) = self.label_re.captures(line) {
                let name = &caps[1];
                // Accept the bare name and the leading-underscore Mach-O form.
                if name == function || name == format!("_{}", function).as_str() {
                    label_count += 1;
                    inside = label_count == 1;
                    continue;
                }
                if inside && !name.starts_with('.') {
                    // Next global symbol ends the block.
                    inside = false;
                }
                continue;
            }

            if !inside {
                continue;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('.') || trimmed.starts_with('#') {
                continue;
            }
            block.push(trimmed.to_string());
        }

        match label_count {
            0 => Err(ProbeError::Analysis(format!(
                "label '{}' not found in listing (symbol may have been inlined away)",
                function
            ))),
            1 => Ok(block),
            n => Err(ProbeError::Analysis(format!(
                "label '{}' is ambiguous: {} definitions in listing",
                function, n
            ))),
        }
    }
}
