//! Compiler version probing.
//!
//! A probe locates a compiler executable and runs it with the family's
//! version flags, capturing stdout and stderr. The resolver only talks to the
//! [`Probe`] trait so it can be driven by a scripted double in tests.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use super::CompilerFamily;
use crate::retry::Transience;
use crate::util::process::{find_executable, ExecError, ProcessBuilder};

/// Upper bound on a single version probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured output of a version probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
}

impl ProbeOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        ProbeOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: Some(0),
        }
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        combined.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') && !self.stderr.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&self.stderr);
        combined
    }
}

/// Failure to locate or run a compiler.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no {family} compiler found on PATH (looked for {})", .searched.join(", "))]
    NotFound {
        family: CompilerFamily,
        searched: Vec<String>,
    },

    #[error("compiler executable not found: {}", .path.display())]
    MissingExecutable { path: PathBuf },

    #[error("`{command}` did not finish within {}s", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },

    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl Transience for ProbeError {
    fn is_transient(&self) -> bool {
        match self {
            ProbeError::NotFound { .. } | ProbeError::MissingExecutable { .. } => false,
            ProbeError::Timeout { .. } => true,
            ProbeError::Io { source, .. } => source.is_transient(),
        }
    }
}

impl ProbeError {
    fn from_exec(err: ExecError, executable: &Path) -> Self {
        match err {
            ExecError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                ProbeError::MissingExecutable {
                    path: executable.to_path_buf(),
                }
            }
            ExecError::Spawn { program, source } | ExecError::Wait { program, source } => {
                ProbeError::Io {
                    command: program,
                    source,
                }
            }
            ExecError::Timeout { program, timeout } => ProbeError::Timeout {
                command: program,
                timeout,
            },
        }
    }
}

/// Locates and runs compilers.
pub trait Probe: Send + Sync {
    /// Find the executable for a compiler family.
    fn locate(&self, family: CompilerFamily) -> Result<PathBuf, ProbeError>;

    /// Run the executable with the family's version flags.
    fn run(&self, family: CompilerFamily, executable: &Path) -> Result<ProbeOutput, ProbeError>;
}

/// Probe backed by real subprocesses.
#[derive(Debug, Clone)]
pub struct ProcessProbe {
    timeout: Duration,
    overrides: BTreeMap<CompilerFamily, PathBuf>,
}

impl Default for ProcessProbe {
    fn default() -> Self {
        ProcessProbe::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl ProcessProbe {
    pub fn new(timeout: Duration) -> Self {
        ProcessProbe {
            timeout,
            overrides: BTreeMap::new(),
        }
    }

    /// Use an explicit executable for a family instead of searching PATH.
    pub fn with_override(mut self, family: CompilerFamily, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(family, path.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Probe for ProcessProbe {
    fn locate(&self, family: CompilerFamily) -> Result<PathBuf, ProbeError> {
        if let Some(path) = self.overrides.get(&family) {
            if path.exists() {
                return Ok(path.clone());
            }
            // Bare names in config are looked up on PATH.
            return find_executable(&path.to_string_lossy()).ok_or_else(|| {
                ProbeError::MissingExecutable { path: path.clone() }
            });
        }

        for name in family.executable_names() {
            if let Some(path) = find_executable(name) {
                tracing::debug!("Found {} candidate: {}", family, path.display());
                return Ok(path);
            }
        }

        Err(ProbeError::NotFound {
            family,
            searched: family
                .executable_names()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
    }

    fn run(&self, family: CompilerFamily, executable: &Path) -> Result<ProbeOutput, ProbeError> {
        // Force untranslated banners so the version patterns match.
        let cmd = ProcessBuilder::new(executable)
            .args(family.version_args())
            .env("LC_ALL", "C")
            .env("VSLANG", "1033");

        tracing::debug!("Probing: {}", cmd.display_command());

        let output = cmd
            .exec_with_timeout(self.timeout)
            .map_err(|e| ProbeError::from_exec(e, executable))?;

        if !output.status.success() {
            // cl.exe exits non-zero without input files; the banner is still usable.
            tracing::debug!(
                "`{}` exited with {:?}",
                cmd.display_command(),
                output.status.code()
            );
        }

        Ok(ProbeOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
