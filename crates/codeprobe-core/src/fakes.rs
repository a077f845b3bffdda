//! Test doubles for the toolchain seam.
//!
//! [`ScriptedToolchain`] stands in for clang so pipelines run end-to-end
//! without a compiler installed: assembly requests play back a canned
//! listing, binary requests install a shell script at the output path that
//! the sanitizer runner then genuinely executes.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ProbeResult;
use crate::toolchain::{Toolchain, ToolchainOutput};

/// A fake compiler with scripted behavior.
#[derive(Debug, Clone)]
pub struct ScriptedToolchain {
    /// Listing returned on stdout for `-o -` (assembly) invocations.
    pub assembly: Option<String>,

    /// Shell body installed (with a `#!/bin/sh` shebang, executable) at the
    /// output path for binary invocations.
    pub binary_script: Option<String>,

    /// Exit code the fake compiler reports.
    pub exit_code: i32,

    /// Stderr the fake compiler reports.
    pub stderr: String,
}

impl Default for ScriptedToolchain {
    fn default() -> Self {
        Self {
            assembly: None,
            binary_script: Some("exit 0\n".to_string()),
            exit_code: 0,
            stderr: String::new(),
        }
    }
}

#[async_trait]
impl Toolchain for ScriptedToolchain {
    async fn invoke(&self, args: &[String], _timeout: Duration) -> ProbeResult<ToolchainOutput> {
        if self.exit_code != 0 {
            return Ok(ToolchainOutput {
                exit_code: self.exit_code,
                stdout: String::new(),
                stderr: self.stderr.clone(),
            });
        }

        let output_path = args
            .iter()
            .position(|a| a == "-o")
            .and_then(|pos| args.get(pos + 1));

        match output_path.map(String::as_str) {
            Some("-") => Ok(ToolchainOutput {
                exit_code: 0,
                stdout: self.assembly.clone().unwrap_or_default(),
                stderr: self.stderr.clone(),
            }),
            Some(path) => {
                if let Some(body) = &self.binary_script {
                    install_script(path, body)?;
                }
                Ok(ToolchainOutput {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: self.stderr.clone(),
                })
            }
            None => Ok(ToolchainOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: self.stderr.clone(),
            }),
        }
    }
}

#[cfg(unix)]
fn install_script(path: &str, body: &str) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, format!("#!/bin/sh\n{}", body))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn install_script(path: &str, body: &str) -> std::io::Result<()> {
    std::fs::write(path, body)
}
