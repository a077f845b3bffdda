//! Harness configuration.

use serde::{Deserialize, Serialize};

use crate::assembly::MnemonicSet;
use crate::sanitizer::MarkerSet;

/// Configuration for one harness run.
///
/// Timeouts follow the original engine's defaults: compilation gets 10s,
/// sanitized execution 5s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    /// Path to the clang binary.
    pub clang_path: String,

    /// Path to the readelf binary (hardening audit).
    pub readelf_path: String,

    /// Cross-compilation target triple for assembly emission.
    pub target: String,

    /// Toolchain invocation timeout in seconds.
    pub compile_timeout_secs: u64,

    /// Sanitized-binary execution timeout in seconds.
    pub run_timeout_secs: u64,

    /// Maximum concurrently running sample pipelines.
    pub max_workers: usize,

    /// Keep per-sample build directories for debugging.
    pub keep_artifacts: bool,

    /// Sanitizer diagnostic markers.
    pub markers: MarkerSet,

    /// Vector mnemonics for the assembly analyzer.
    pub mnemonics: MnemonicSet,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            clang_path: "clang".to_string(),
            readelf_path: "readelf".to_string(),
            target: "x86_64".to_string(),
            compile_timeout_secs: 10,
            run_timeout_secs: 5,
            max_workers: 4,
            keep_artifacts: false,
            markers: MarkerSet::default(),
            mnemonics: MnemonicSet::x86_64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_config_default() {
        let config = HarnessConfig::default();
        assert_eq!(config.clang_path, "clang");
        assert_eq!(config.compile_timeout_secs, 10);
        assert_eq!(config.run_timeout_secs, 5);
        assert_eq!(config.max_workers, 4);
        assert!(!config.keep_artifacts);
        assert_eq!(config.mnemonics.arch, "x86_64");
    }

    #[test]
    fn test_harness_config_serde_roundtrip() {
        let config = HarnessConfig {
            target: "aarch64-linux-gnu".to_string(),
            mnemonics: MnemonicSet::aarch64(),
            max_workers: 1,
            ..HarnessConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: HarnessConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
