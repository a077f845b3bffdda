//! Compiler driver: turns samples into runnable binaries or assembly listings.
//!
//! The driver owns the external-toolchain contract. Every invocation runs in
//! a scoped temporary build directory that is removed on all exit paths
//! unless the caller asks to keep it for debugging. A non-zero toolchain
//! exit is always surfaced as [`ProbeError::Compile`] — there is no partial
//! artifact.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ProbeError, ProbeResult};
use crate::sample::SampleFile;

// ---------------------------------------------------------------------------
// Toolchain seam
// ---------------------------------------------------------------------------

/// Raw output of one external command invocation.
#[derive(Debug, Clone)]
pub struct ToolchainOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,
}

/// Trait for toolchain backends.
///
/// Production uses [`ClangToolchain`]; tests substitute a scripted fake so
/// the pipeline runs without a compiler installed.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Invoke the compiler with the given arguments under a timeout.
    async fn invoke(&self, args: &[String], timeout: Duration) -> ProbeResult<ToolchainOutput>;
}

/// Invokes a real clang binary (on `$PATH` or at a configured location).
pub struct ClangToolchain {
    binary: String,
}

impl ClangToolchain {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Toolchain for ClangToolchain {
    async fn invoke(&self, args: &[String], timeout: Duration) -> ProbeResult<ToolchainOutput> {
        run_captured(&self.binary, args, timeout).await
    }
}

/// Run an external command with piped output and a hard timeout.
///
/// The child is spawned with `kill_on_drop`, so a timeout (or a cancelled
/// caller) force-terminates it — no orphaned subprocess on any exit path.
pub async fn run_captured(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> ProbeResult<ToolchainOutput> {
    let start = Instant::now();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProbeError::Timeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
            limit_ms: timeout.as_millis() as u64,
        })??;

    Ok(ToolchainOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

// ---------------------------------------------------------------------------
// Flag sets
// ---------------------------------------------------------------------------

/// Compilation flavor for one driver invocation.
///
/// Sanitizer and assembly emission are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagSet {
    /// `-fsanitize=address,undefined -g` — produces a runnable binary.
    Sanitize,

    /// `-O3 -S --target=<triple>` — produces a textual listing on stdout.
    /// Intel syntax is requested for x86 triples.
    EmitAssembly { target: String },

    /// Default flags — runnable binary for the hardening audit.
    Plain,
}

impl FlagSet {
    /// Short name used in reports and lineage digests.
    pub fn label(&self) -> &'static str {
        match self {
            FlagSet::Sanitize => "sanitize",
            FlagSet::EmitAssembly { .. } => "assembly",
            FlagSet::Plain => "plain",
        }
    }

    /// Concrete argv for a given source and output path.
    fn args(&self, source: &Path, output: &Path) -> Vec<String> {
        let source = source.display().to_string();
        let output = output.display().to_string();

        match self {
            FlagSet::Sanitize => vec![
                "-fsanitize=address,undefined".to_string(),
                "-g".to_string(),
                source,
                "-o".to_string(),
                output,
            ],
            FlagSet::EmitAssembly { target } => {
                let mut args = vec![
                    "-O3".to_string(),
                    "-S".to_string(),
                    format!("--target={}", target),
                    source,
                    "-o".to_string(),
                    "-".to_string(),
                ];
                if target.contains("x86") {
                    args.push("-mllvm".to_string());
                    args.push("--x86-asm-syntax=intel".to_string());
                }
                args
            }
            FlagSet::Plain => vec![source, "-o".to_string(), output],
        }
    }

    /// Path-independent tokens hashed into the lineage digest, so the same
    /// sample and flags always digest identically across runs.
    fn digest_tokens(&self) -> Vec<String> {
        match self {
            FlagSet::Sanitize => vec![
                "-fsanitize=address,undefined".to_string(),
                "-g".to_string(),
            ],
            FlagSet::EmitAssembly { target } => {
                vec!["-O3".to_string(), "-S".to_string(), format!("--target={}", target)]
            }
            FlagSet::Plain => vec![],
        }
    }
}

/// Deterministic digest binding an artifact to its source and flag set.
pub fn lineage_digest(source: &str, flags: &FlagSet) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"\0");
    hasher.update(flags.label().as_bytes());
    for token in flags.digest_tokens() {
        hasher.update(b"\0");
        hasher.update(token.as_bytes());
    }
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Payload of a successful compilation.
#[derive(Debug)]
pub enum ArtifactKind {
    /// Runnable binary inside the artifact's build directory.
    Binary(PathBuf),

    /// Full assembly listing captured from the compiler's stdout.
    Assembly(String),
}

/// A compilation product tied to exactly one sample and one flag set.
///
/// Holds the scoped build directory; dropping the artifact removes it
/// unless retention was requested at compile time.
#[derive(Debug)]
pub struct CompilationArtifact {
    /// Binary path or assembly text.
    pub kind: ArtifactKind,

    /// Flags the artifact was built with.
    pub flags: FlagSet,

    /// SHA-256 over (source, flag set); stable across runs.
    pub lineage_digest: String,

    workdir: Option<TempDir>,
}

impl CompilationArtifact {
    /// Binary path, if this artifact is runnable.
    pub fn binary_path(&self) -> Option<&Path> {
        match &self.kind {
            ArtifactKind::Binary(path) => Some(path),
            ArtifactKind::Assembly(_) => None,
        }
    }

    /// Assembly listing, if this artifact is textual.
    pub fn assembly(&self) -> Option<&str> {
        match &self.kind {
            ArtifactKind::Assembly(text) => Some(text),
            ArtifactKind::Binary(_) => None,
        }
    }

    /// Detach the build directory from scope-based cleanup and return its
    /// path. The caller owns removal from here on.
    pub fn retain(&mut self) -> Option<PathBuf> {
        self.workdir.take().map(|dir| dir.into_path())
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Drives the external toolchain for one sample at a time.
pub struct CompilerDriver {
    toolchain: Arc<dyn Toolchain>,
    compile_timeout: Duration,
    keep_artifacts: bool,
}

impl CompilerDriver {
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        compile_timeout: Duration,
        keep_artifacts: bool,
    ) -> Self {
        Self {
            toolchain,
            compile_timeout,
            keep_artifacts,
        }
    }

    /// Compile a sample under the given flag set.
    ///
    /// Writes the source into a fresh temp directory, invokes the toolchain,
    /// and returns the artifact. Non-zero exit (or a reported success with
    /// no output file) is a [`ProbeError::Compile`].
    pub async fn compile(
        &self,
        sample: &SampleFile,
        flags: FlagSet,
    ) -> ProbeResult<CompilationArtifact> {
        let workdir = tempfile::Builder::new().prefix("codeprobe-").tempdir()?;

        let source_path = workdir
            .path()
            .join(format!("{}.{}", sample.stem(), sample.language.extension()));
        std::fs::write(&source_path, &sample.source)?;

        let output_path = workdir.path().join(format!("{}.bin", sample.stem()));
        let args = flags.args(&source_path, &output_path);
        let digest = lineage_digest(&sample.source, &flags);

        debug!(
            sample = %sample.path.display(),
            flags = flags.label(),
            "invoking toolchain"
        );

        let result = self.toolchain.invoke(&args, self.compile_timeout).await?;
        if result.exit_code != 0 {
            return Err(ProbeError::Compile {
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }

        match flags {
            FlagSet::EmitAssembly { .. } => {
                // Listing was captured from stdout; the build dir is done.
                Ok(CompilationArtifact {
                    kind: ArtifactKind::Assembly(result.stdout),
                    flags,
                    lineage_digest: digest,
                    workdir: None,
                })
            }
            FlagSet::Sanitize | FlagSet::Plain => {
                if !output_path.exists() {
                    return Err(ProbeError::Compile {
                        exit_code: 0,
                        stderr: format!(
                            "toolchain reported success but produced no binary: {}",
                            result.stderr
                        ),
                    });
                }

                let mut artifact = CompilationArtifact {
                    kind: ArtifactKind::Binary(output_path),
                    flags,
                    lineage_digest: digest,
                    workdir: Some(workdir),
                };
                if self.keep_artifacts {
                    if let Some(kept) = artifact.retain() {
                        debug!(dir = %kept.display(), "retaining build directory");
                    }
                }
                Ok(artifact)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Goal, Language};

    fn sample(source: &str) -> SampleFile {
        SampleFile {
            path: PathBuf::from("mem/overflow.c"),
            language: Language::C,
            goal: Goal::SanitizerSuite,
            goal_text: None,
            source: source.to_string(),
        }
    }

    /// Fake toolchain that records args and plays back a canned result.
    struct CannedToolchain {
        exit_code: i32,
        stdout: String,
        stderr: String,
        write_output: bool,
    }

    #[async_trait]
    impl Toolchain for CannedToolchain {
        async fn invoke(
            &self,
            args: &[String],
            _timeout: Duration,
        ) -> ProbeResult<ToolchainOutput> {
            if self.write_output {
                // Mimic a compiler writing the file named after `-o`.
                if let Some(pos) = args.iter().position(|a| a == "-o") {
                    let out = &args[pos + 1];
                    if out != "-" {
                        std::fs::write(out, b"\x7fELF-fake").unwrap();
                    }
                }
            }
            Ok(ToolchainOutput {
                exit_code: self.exit_code,
                stdout: self.stdout.clone(),
                stderr: self.stderr.clone(),
            })
        }
    }

    #[test]
    fn test_sanitize_args_shape() {
        let args = FlagSet::Sanitize.args(Path::new("/tmp/a.c"), Path::new("/tmp/a.bin"));
        assert_eq!(args[0], "-fsanitize=address,undefined");
        assert!(args.contains(&"-g".to_string()));
        assert!(args.contains(&"/tmp/a.bin".to_string()));
    }

    #[test]
    fn test_assembly_args_intel_syntax_only_for_x86() {
        let x86 = FlagSet::EmitAssembly {
            target: "x86_64".to_string(),
        };
        let args = x86.args(Path::new("a.cpp"), Path::new("unused"));
        assert!(args.contains(&"--x86-asm-syntax=intel".to_string()));
        assert!(args.contains(&"-o".to_string()));
        assert!(args.contains(&"-".to_string()));

        let arm = FlagSet::EmitAssembly {
            target: "aarch64-linux-gnu".to_string(),
        };
        let args = arm.args(Path::new("a.cpp"), Path::new("unused"));
        assert!(!args.contains(&"--x86-asm-syntax=intel".to_string()));
    }

    #[test]
    fn test_lineage_digest_deterministic() {
        let a = lineage_digest("int main(){}", &FlagSet::Sanitize);
        let b = lineage_digest("int main(){}", &FlagSet::Sanitize);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lineage_digest_depends_on_flags_and_source() {
        let base = lineage_digest("int main(){}", &FlagSet::Sanitize);
        assert_ne!(base, lineage_digest("int main(){}", &FlagSet::Plain));
        assert_ne!(base, lineage_digest("int main(){ return 1; }", &FlagSet::Sanitize));
        assert_ne!(
            lineage_digest(
                "x",
                &FlagSet::EmitAssembly {
                    target: "x86_64".to_string()
                }
            ),
            lineage_digest(
                "x",
                &FlagSet::EmitAssembly {
                    target: "aarch64".to_string()
                }
            ),
        );
    }

    #[tokio::test]
    async fn test_compile_nonzero_exit_is_compile_error() {
        let toolchain = Arc::new(CannedToolchain {
            exit_code: 1,
            stdout: String::new(),
            stderr: "error: expected ';'".to_string(),
            write_output: false,
        });
        let driver = CompilerDriver::new(toolchain, Duration::from_secs(10), false);

        let err = driver
            .compile(&sample("int main() {"), FlagSet::Sanitize)
            .await
            .unwrap_err();
        match err {
            ProbeError::Compile { exit_code, stderr } => {
                assert_eq!(exit_code, 1);
                assert!(stderr.contains("expected ';'"));
            }
            other => panic!("expected Compile, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_compile_success_without_binary_is_compile_error() {
        let toolchain = Arc::new(CannedToolchain {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            write_output: false,
        });
        let driver = CompilerDriver::new(toolchain, Duration::from_secs(10), false);

        let err = driver
            .compile(&sample("int main() { return 0; }"), FlagSet::Sanitize)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Compile { .. }));
    }

    #[tokio::test]
    async fn test_compile_binary_artifact_and_cleanup() {
        let toolchain = Arc::new(CannedToolchain {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            write_output: true,
        });
        let driver = CompilerDriver::new(toolchain, Duration::from_secs(10), false);

        let artifact = driver
            .compile(&sample("int main() { return 0; }"), FlagSet::Sanitize)
            .await
            .expect("compile failed");

        let path = artifact.binary_path().expect("should be a binary").to_path_buf();
        assert!(path.exists());
        assert!(artifact.assembly().is_none());
        assert_eq!(artifact.flags.label(), "sanitize");

        drop(artifact);
        assert!(!path.exists(), "build dir should be removed on drop");
    }

    #[tokio::test]
    async fn test_compile_assembly_artifact_captures_stdout() {
        let listing = ".text\nadd_arrays:\n\tret\n";
        let toolchain = Arc::new(CannedToolchain {
            exit_code: 0,
            stdout: listing.to_string(),
            stderr: String::new(),
            write_output: false,
        });
        let driver = CompilerDriver::new(toolchain, Duration::from_secs(10), false);

        let artifact = driver
            .compile(
                &sample("void add_arrays() {}"),
                FlagSet::EmitAssembly {
                    target: "x86_64".to_string(),
                },
            )
            .await
            .expect("compile failed");

        assert_eq!(artifact.assembly(), Some(listing));
        assert!(artifact.binary_path().is_none());
    }

    #[tokio::test]
    async fn test_run_captured_captures_exit_and_output() {
        let out = run_captured("sh", &["-c".to_string(), "echo hi; exit 3".to_string()], Duration::from_secs(5))
            .await
            .expect("run failed");
        assert_eq!(out.exit_code, 3);
        assert!(out.stdout.contains("hi"));
    }

    #[tokio::test]
    async fn test_run_captured_times_out() {
        let err = run_captured(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
    }
}
