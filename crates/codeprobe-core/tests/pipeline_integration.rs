//! Integration tests for the sample pipeline with a scripted toolchain.
//!
//! The fake compiler plays back listings and installs shell-script
//! "binaries", so the full pipeline — discovery, driver, runner, analyzer,
//! worker pool, report gate — runs without clang installed.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;

use codeprobe_core::fakes::ScriptedToolchain;
use codeprobe_core::{
    scan_directory, Classification, Goal, HarnessConfig, ProbePipeline, SampleFile, SampleOutcome,
};

const ASAN_SCRIPT: &str = "\
echo '==7==ERROR: AddressSanitizer: heap-buffer-overflow on address 0x604000000038' >&2
echo 'WRITE of size 4 at 0x604000000038 thread T0' >&2
exit 1
";

const SCALAR_LISTING: &str = "\
\t.text
\t.globl\tadd_arrays
add_arrays:
\ttest\tecx, ecx
\tjle\t.LBB0_3
.LBB0_2:
\tmov\teax, dword ptr [rsi + 4*rcx]
\tadd\teax, dword ptr [rdx + 4*rcx]
\tmov\tdword ptr [rdi + 4*rcx], eax
\tjne\t.LBB0_2
.LBB0_3:
\tret
";

fn write_sample(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

fn scripted_pipeline(config: HarnessConfig) -> Arc<ProbePipeline> {
    let toolchain = ScriptedToolchain {
        assembly: Some(SCALAR_LISTING.to_string()),
        binary_script: Some(ASAN_SCRIPT.to_string()),
        ..ScriptedToolchain::default()
    };
    Arc::new(ProbePipeline::new(config, Arc::new(toolchain)))
}

/// Test: a mixed directory runs end-to-end; both fixture goals conform.
#[tokio::test]
async fn test_directory_run_with_both_fixture_goals() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(
        dir.path(),
        "heap_overflow.c",
        "// Goal: Test run_sanitizer_suite\nint main() { return 0; }\n",
    );
    write_sample(
        dir.path(),
        "vectorization_fail.cpp",
        "// Goal: Test analyze_assembly_essence\nvoid add_arrays(int* a, int* b, int* c, int n) {}\n",
    );

    let samples = scan_directory(dir.path()).expect("scan failed");
    assert_eq!(samples.len(), 2);

    let pipeline = scripted_pipeline(HarnessConfig::default());
    let report = pipeline.run_samples(samples).await;

    assert_eq!(report.samples.len(), 2);
    assert!(report.all_conforming(), "both fixtures should conform");
    assert!(!report.run_id.is_empty());

    // Input (sorted) order is preserved regardless of completion order.
    assert!(report.samples[0].path.ends_with("heap_overflow.c"));
    assert!(report.samples[1].path.ends_with("vectorization_fail.cpp"));

    match &report.samples[0].outcome {
        SampleOutcome::Sanitizer { report } => {
            assert_eq!(report.classification, Classification::SanitizerError);
            assert!(report
                .marker_line
                .as_deref()
                .unwrap()
                .contains("heap-buffer-overflow"));
        }
        other => panic!("expected Sanitizer outcome, got {:?}", other),
    }
    match &report.samples[1].outcome {
        SampleOutcome::Vectorization { verdict } => {
            assert_eq!(verdict.function, "add_arrays");
            assert!(!verdict.vectorized);
        }
        other => panic!("expected Vectorization outcome, got {:?}", other),
    }
}

/// Test: a sample with no recognized goal is reported, and fails the gate.
#[tokio::test]
async fn test_unspecified_sample_fails_gate_without_crashing() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(
        dir.path(),
        "heap_overflow.c",
        "// Goal: Test run_sanitizer_suite\nint main() { return 0; }\n",
    );
    write_sample(dir.path(), "mystery.c", "int main() { return 0; }\n");

    let samples = scan_directory(dir.path()).expect("scan failed");
    let pipeline = scripted_pipeline(HarnessConfig::default());
    let report = pipeline.run_samples(samples).await;

    assert_eq!(report.samples.len(), 2);
    assert_eq!(report.conforming_count(), 1);
    assert!(!report.all_conforming());

    let mystery = &report.samples[1];
    assert_eq!(mystery.goal, Goal::Unspecified);
    assert_eq!(mystery.outcome, SampleOutcome::Unspecified);
}

/// Test: a clean binary under a sanitizer goal is classified Clean and
/// therefore non-conforming (the fixture was supposed to trip a sanitizer).
#[tokio::test]
async fn test_clean_run_does_not_conform_to_sanitizer_goal() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(
        dir.path(),
        "fine.c",
        "// Goal: run_sanitizer_suite\nint main() { return 0; }\n",
    );

    let toolchain = ScriptedToolchain {
        binary_script: Some("echo ok\nexit 0\n".to_string()),
        ..ScriptedToolchain::default()
    };
    let pipeline = Arc::new(ProbePipeline::new(
        HarnessConfig::default(),
        Arc::new(toolchain),
    ));

    let samples = scan_directory(dir.path()).expect("scan failed");
    let report = pipeline.run_samples(samples).await;

    match &report.samples[0].outcome {
        SampleOutcome::Sanitizer { report } => {
            assert_eq!(report.classification, Classification::Clean);
            assert_eq!(report.exit_code, 0);
            assert!(report.stdout.contains("ok"));
        }
        other => panic!("expected Sanitizer outcome, got {:?}", other),
    }
    assert!(!report.all_conforming());
}

/// Test: a crash without sanitizer markers is RuntimeCrash, not
/// SanitizerError.
#[tokio::test]
async fn test_crash_without_marker_is_runtime_crash() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(
        dir.path(),
        "crash.c",
        "// Goal: run_sanitizer_suite\nint main() { return 0; }\n",
    );

    let toolchain = ScriptedToolchain {
        binary_script: Some("echo 'Segmentation fault' >&2\nexit 139\n".to_string()),
        ..ScriptedToolchain::default()
    };
    let pipeline = Arc::new(ProbePipeline::new(
        HarnessConfig::default(),
        Arc::new(toolchain),
    ));

    let samples = scan_directory(dir.path()).expect("scan failed");
    let report = pipeline.run_samples(samples).await;

    match &report.samples[0].outcome {
        SampleOutcome::Sanitizer { report } => {
            assert_eq!(report.classification, Classification::RuntimeCrash);
            assert!(report.marker_line.is_none());
        }
        other => panic!("expected Sanitizer outcome, got {:?}", other),
    }
}

/// Test: many samples through a small pool still produce one report each,
/// in input order.
#[tokio::test]
async fn test_worker_pool_preserves_input_order() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..8 {
        write_sample(
            dir.path(),
            &format!("sample_{}.c", i),
            "// Goal: run_sanitizer_suite\nint main() { return 0; }\n",
        );
    }

    let samples = scan_directory(dir.path()).expect("scan failed");
    let config = HarnessConfig {
        max_workers: 2,
        ..HarnessConfig::default()
    };
    let pipeline = scripted_pipeline(config);
    let report = pipeline.run_samples(samples).await;

    assert_eq!(report.samples.len(), 8);
    for (i, sample) in report.samples.iter().enumerate() {
        assert!(
            sample.path.ends_with(format!("sample_{}.c", i)),
            "report {} out of order: {}",
            i,
            sample.path.display()
        );
    }
}

/// Test: re-running the same sample with the same flags is deterministic —
/// same classification, same lineage digest.
#[tokio::test]
async fn test_pipeline_is_idempotent_per_sample() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(
        dir.path(),
        "heap_overflow.c",
        "// Goal: run_sanitizer_suite\nint main() { return 0; }\n",
    );
    let sample = SampleFile::load(&dir.path().join("heap_overflow.c")).unwrap();

    let pipeline = scripted_pipeline(HarnessConfig::default());
    let first = pipeline.process_sample(&sample).await;
    let second = pipeline.process_sample(&sample).await;

    assert_eq!(first.outcome, second.outcome);
    assert_eq!(first.lineage_digest, second.lineage_digest);
    assert!(first.lineage_digest.is_some());
}

/// Test: timed-out samples are reported as timeouts and leave no child
/// process holding the pipeline open.
#[tokio::test]
async fn test_timeout_sample_reports_timeout_kind() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(
        dir.path(),
        "hang.c",
        "// Goal: run_sanitizer_suite\nint main() { for(;;); }\n",
    );

    let toolchain = ScriptedToolchain {
        binary_script: Some("sleep 30\n".to_string()),
        ..ScriptedToolchain::default()
    };
    let config = HarnessConfig {
        run_timeout_secs: 1,
        ..HarnessConfig::default()
    };
    let pipeline = Arc::new(ProbePipeline::new(config, Arc::new(toolchain)));

    let samples = scan_directory(dir.path()).expect("scan failed");
    let start = std::time::Instant::now();
    let report = pipeline.run_samples(samples).await;
    assert!(
        start.elapsed() < std::time::Duration::from_secs(10),
        "timed-out child must be force-killed"
    );

    match &report.samples[0].outcome {
        SampleOutcome::Error { error_kind, .. } => assert_eq!(error_kind, "timeout"),
        other => panic!("expected timeout Error outcome, got {:?}", other),
    }
    assert!(!report.all_conforming());
}
