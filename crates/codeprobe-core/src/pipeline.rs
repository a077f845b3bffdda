//! Per-sample pipelines and the bounded worker pool.
//!
//! A sample's stages (compile, then run/analyze/audit) are strictly
//! sequential. Samples share no mutable state, so up to `max_workers`
//! pipelines run concurrently; completion order is unspecified but the
//! final report lists samples in input order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assembly::{AssemblyAnalyzer, VectorizationVerdict};
use crate::audit::{AuditReport, BinaryAuditor};
use crate::config::HarnessConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::obs;
use crate::report::{error_report, HarnessReport, SampleOutcome, SampleReport};
use crate::sample::{Goal, SampleFile};
use crate::sanitizer::{DiagnosticReport, SanitizerRunner};
use crate::toolchain::{ClangToolchain, CompilerDriver, FlagSet, Toolchain};

/// Orchestrates compile → probe → report for samples.
pub struct ProbePipeline {
    driver: CompilerDriver,
    runner: SanitizerRunner,
    analyzer: AssemblyAnalyzer,
    auditor: BinaryAuditor,
    config: HarnessConfig,
}

impl ProbePipeline {
    /// Build a pipeline over an explicit toolchain backend.
    pub fn new(config: HarnessConfig, toolchain: Arc<dyn Toolchain>) -> Self {
        let driver = CompilerDriver::new(
            toolchain,
            Duration::from_secs(config.compile_timeout_secs),
            config.keep_artifacts,
        );
        let runner = SanitizerRunner::new(
            Duration::from_secs(config.run_timeout_secs),
            config.markers.clone(),
        );
        let analyzer = AssemblyAnalyzer::new(config.mnemonics.clone());
        let auditor = BinaryAuditor::new(
            config.readelf_path.clone(),
            Duration::from_secs(config.run_timeout_secs),
        );

        Self {
            driver,
            runner,
            analyzer,
            auditor,
            config,
        }
    }

    /// Build a pipeline over the configured clang binary.
    pub fn with_clang(config: HarnessConfig) -> Self {
        let toolchain = Arc::new(ClangToolchain::new(config.clang_path.clone()));
        Self::new(config, toolchain)
    }

    /// Compile with sanitizers and run.
    pub async fn sanitize(
        &self,
        sample: &SampleFile,
    ) -> ProbeResult<(String, DiagnosticReport)> {
        let artifact = self.driver.compile(sample, FlagSet::Sanitize).await?;
        let report = self.runner.run(&artifact).await?;
        Ok((artifact.lineage_digest.clone(), report))
    }

    /// Compile to assembly and analyze the target function.
    ///
    /// When `function` is `None` (directory mode — the goal header names no
    /// symbol), the first non-local label in the listing is analyzed.
    pub async fn analyze_assembly(
        &self,
        sample: &SampleFile,
        function: Option<&str>,
    ) -> ProbeResult<(String, VectorizationVerdict)> {
        let flags = FlagSet::EmitAssembly {
            target: self.config.target.clone(),
        };
        let artifact = self.driver.compile(sample, flags).await?;
        let listing = artifact
            .assembly()
            .ok_or(ProbeError::ArtifactMismatch { expected: "assembly" })?;

        let function = match function {
            Some(name) => name.to_string(),
            None => self.analyzer.first_function(listing)?,
        };
        let verdict = self.analyzer.analyze(listing, &function)?;
        Ok((artifact.lineage_digest.clone(), verdict))
    }

    /// Compile with default flags and audit the binary.
    pub async fn audit(&self, sample: &SampleFile) -> ProbeResult<(String, AuditReport)> {
        let artifact = self.driver.compile(sample, FlagSet::Plain).await?;
        let report = self.auditor.audit(&artifact).await?;
        Ok((artifact.lineage_digest.clone(), report))
    }

    /// Run the probe selected by the sample's goal.
    ///
    /// Never fails: every error becomes a structured report entry naming
    /// the sample and error kind.
    pub async fn process_sample(&self, sample: &SampleFile) -> SampleReport {
        let start = Instant::now();

        let result: ProbeResult<(Option<String>, SampleOutcome)> = match sample.goal {
            Goal::Unspecified => Ok((None, SampleOutcome::Unspecified)),
            Goal::SanitizerSuite => self
                .sanitize(sample)
                .await
                .map(|(digest, report)| (Some(digest), SampleOutcome::Sanitizer { report })),
            Goal::AssemblyEssence => self
                .analyze_assembly(sample, None)
                .await
                .map(|(digest, verdict)| (Some(digest), SampleOutcome::Vectorization { verdict })),
            Goal::BinaryAudit => self
                .audit(sample)
                .await
                .map(|(digest, report)| (Some(digest), SampleOutcome::Audit { report })),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok((lineage_digest, outcome)) => SampleReport {
                path: sample.path.clone(),
                language: sample.language,
                goal: sample.goal,
                lineage_digest,
                outcome,
                duration_ms,
                finished_at: Utc::now(),
            },
            Err(err) => {
                warn!(
                    sample = %sample.path.display(),
                    kind = err.kind(),
                    error = %err,
                    "sample pipeline failed"
                );
                error_report(sample, err.kind(), err.to_string(), duration_ms)
            }
        }
    }

    /// Process all samples through a fixed-size worker pool.
    pub async fn run_samples(self: Arc<Self>, samples: Vec<SampleFile>) -> HarnessReport {
        let run_id = Uuid::new_v4().to_string();
        let _span = obs::RunSpan::enter(&run_id);
        obs::emit_run_started(&run_id, samples.len());

        let start = Instant::now();
        let max_workers = self.config.max_workers.max(1);

        let mut join_set: JoinSet<(usize, SampleReport)> = JoinSet::new();
        let mut indexed: Vec<(usize, SampleReport)> = Vec::new();

        for (index, sample) in samples.into_iter().enumerate() {
            // Bounded pool: drain one finished pipeline before exceeding
            // the worker budget.
            while join_set.len() >= max_workers {
                match join_set.join_next().await {
                    Some(Ok(pair)) => indexed.push(pair),
                    Some(Err(err)) => warn!(error = %err, "sample task panicked"),
                    None => break,
                }
            }

            let pipeline = Arc::clone(&self);
            let run_id = run_id.clone();
            join_set.spawn(async move {
                let report = pipeline.process_sample(&sample).await;
                obs::emit_sample_finished(
                    &run_id,
                    &sample.path.display().to_string(),
                    sample.goal.name(),
                    report.conforming(),
                    report.duration_ms,
                );
                (index, report)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(pair) => indexed.push(pair),
                Err(err) => warn!(error = %err, "sample task panicked"),
            }
        }

        indexed.sort_by_key(|(index, _)| *index);
        let samples: Vec<SampleReport> = indexed.into_iter().map(|(_, report)| report).collect();

        let duration_ms = start.elapsed().as_millis() as u64;
        let report = HarnessReport {
            run_id: run_id.clone(),
            samples,
            duration_ms,
            generated_at: Utc::now(),
        };

        obs::emit_run_finished(
            &run_id,
            duration_ms,
            report.conforming_count(),
            report.samples.len(),
        );
        info!(
            run_id = %run_id,
            conforming = report.conforming_count(),
            total = report.samples.len(),
            "harness run finished"
        );
        report
    }
}
