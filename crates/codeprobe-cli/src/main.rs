//! codeprobe - compiler-backed diagnostics for C/C++ samples
//!
//! ## Commands
//!
//! - `run`: process every sample in a directory per its `Goal:` header
//! - `san`: compile one sample with sanitizers and classify the run
//! - `asm`: compile one sample to assembly and analyze a function
//! - `audit`: compile one sample and audit binary hardening

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

use codeprobe_core::{
    init_tracing, scan_directory, HarnessConfig, ProbePipeline, SampleFile,
};

#[derive(Parser)]
#[command(name = "codeprobe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compiler-backed diagnostic harness for C/C++ samples", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted output and log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Toolchain options shared by every subcommand.
#[derive(clap::Args)]
struct ToolchainOpts {
    /// Path to the clang binary
    #[arg(long, default_value = "clang", env = "CODEPROBE_CLANG")]
    clang: String,

    /// Target triple for assembly emission
    #[arg(long, default_value = "x86_64")]
    target: String,

    /// Toolchain invocation timeout in seconds
    #[arg(long, default_value = "10")]
    compile_timeout_secs: u64,

    /// Subprocess (sanitized run / readelf) timeout in seconds
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Keep per-sample build directories for debugging
    #[arg(long)]
    keep_artifacts: bool,
}

impl ToolchainOpts {
    fn to_config(&self) -> HarnessConfig {
        HarnessConfig {
            clang_path: self.clang.clone(),
            target: self.target.clone(),
            compile_timeout_secs: self.compile_timeout_secs,
            run_timeout_secs: self.timeout_secs,
            keep_artifacts: self.keep_artifacts,
            ..HarnessConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Process every sample in a directory per its Goal header
    Run {
        /// Directory of C/C++ sample files
        dir: PathBuf,

        /// Maximum concurrent sample pipelines
        #[arg(short, long, default_value = "4")]
        workers: usize,

        #[command(flatten)]
        toolchain: ToolchainOpts,
    },

    /// Compile one sample with sanitizers and classify the run
    San {
        /// Sample source file
        file: PathBuf,

        #[command(flatten)]
        toolchain: ToolchainOpts,
    },

    /// Compile one sample to assembly and analyze a function
    Asm {
        /// Sample source file
        file: PathBuf,

        /// Function to analyze (default: first function in the listing)
        #[arg(short, long)]
        function: Option<String>,

        #[command(flatten)]
        toolchain: ToolchainOpts,
    },

    /// Compile one sample and audit binary hardening
    Audit {
        /// Sample source file
        file: PathBuf,

        #[command(flatten)]
        toolchain: ToolchainOpts,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            dir,
            workers,
            toolchain,
        } => {
            let config = HarnessConfig {
                max_workers: workers,
                ..toolchain.to_config()
            };
            cmd_run(&dir, config, cli.json).await
        }
        Commands::San { file, toolchain } => cmd_san(&file, toolchain.to_config(), cli.json).await,
        Commands::Asm {
            file,
            function,
            toolchain,
        } => cmd_asm(&file, function.as_deref(), toolchain.to_config(), cli.json).await,
        Commands::Audit { file, toolchain } => {
            cmd_audit(&file, toolchain.to_config(), cli.json).await
        }
    }
}

/// Run the whole harness over a sample directory.
///
/// Exit status is 0 only when every sample behaved per its declared goal.
async fn cmd_run(dir: &Path, config: HarnessConfig, json: bool) -> Result<()> {
    let samples = scan_directory(dir)
        .with_context(|| format!("failed to scan sample directory {}", dir.display()))?;
    if samples.is_empty() {
        anyhow::bail!("no C/C++ samples found in {}", dir.display());
    }

    let pipeline = Arc::new(ProbePipeline::with_clang(config));
    let report = pipeline.run_samples(samples).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }

    if !report.all_conforming() {
        std::process::exit(1);
    }
    Ok(())
}

/// Sanitizer suite for a single sample.
async fn cmd_san(file: &Path, config: HarnessConfig, json: bool) -> Result<()> {
    let sample = SampleFile::load(file)
        .with_context(|| format!("failed to load sample {}", file.display()))?;

    let pipeline = ProbePipeline::with_clang(config);
    let (digest, report) = pipeline
        .sanitize(&sample)
        .await
        .with_context(|| format!("sanitizer suite failed for {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("sample:         {}", file.display());
        println!("artifact:       {}", digest);
        println!("exit code:      {}", report.exit_code);
        println!("classification: {:?}", report.classification);
        if let Some(line) = &report.marker_line {
            println!("marker:         {}", line.trim());
        }
    }
    Ok(())
}

/// Vectorization analysis for a single sample.
async fn cmd_asm(
    file: &Path,
    function: Option<&str>,
    config: HarnessConfig,
    json: bool,
) -> Result<()> {
    let sample = SampleFile::load(file)
        .with_context(|| format!("failed to load sample {}", file.display()))?;

    let pipeline = ProbePipeline::with_clang(config);
    let (digest, verdict) = pipeline
        .analyze_assembly(&sample, function)
        .await
        .with_context(|| format!("assembly analysis failed for {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        println!("sample:     {}", file.display());
        println!("artifact:   {}", digest);
        println!("function:   {}", verdict.function);
        println!("vectorized: {}", verdict.vectorized);
        for line in &verdict.evidence {
            println!("  evidence: {}", line);
        }
    }
    Ok(())
}

/// Hardening audit for a single sample.
async fn cmd_audit(file: &Path, config: HarnessConfig, json: bool) -> Result<()> {
    let sample = SampleFile::load(file)
        .with_context(|| format!("failed to load sample {}", file.display()))?;

    let pipeline = ProbePipeline::with_clang(config);
    let (digest, report) = pipeline
        .audit(&sample)
        .await
        .with_context(|| format!("binary audit failed for {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("sample:   {}", file.display());
        println!("artifact: {}", digest);
        println!("pie:      {:?}", report.pie);
        println!("nx:       {:?}", report.nx);
    }
    Ok(())
}
