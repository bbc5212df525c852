//! Test utilities and mocks for pilot unit tests.
//!
//! [`MockProbe`] stands in for real compilers: each family is given a path
//! and a script of probe outcomes, consumed in order. The last step repeats
//! once the script runs out.
//!
//! # Example
//!
//! ```rust,ignore
//! use pilot::test_support::{MockProbe, ProbeStep, fixtures};
//!
//! let probe = MockProbe::new()
//!     .with_compiler(CompilerFamily::Gcc, "/usr/bin/gcc", fixtures::GCC_13)
//!     .with_script(CompilerFamily::Clang, "/usr/bin/clang", vec![
//!         ProbeStep::Timeout,
//!         ProbeStep::output(fixtures::CLANG_17),
//!     ]);
//! ```

pub mod fixtures;

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::toolchain::{CompilerFamily, Probe, ProbeError, ProbeOutput};

/// One scripted outcome of running a compiler.
#[derive(Debug, Clone)]
pub enum ProbeStep {
    Output(ProbeOutput),
    Timeout,
    Io(io::ErrorKind),
    /// The executable vanished between locate and run.
    Missing,
}

impl ProbeStep {
    /// A successful run printing `banner` on stdout.
    pub fn output(banner: &str) -> Self {
        ProbeStep::Output(ProbeOutput::new(banner, ""))
    }

    /// A successful run printing `banner` on stderr, as `cl.exe` does.
    pub fn stderr(banner: &str) -> Self {
        ProbeStep::Output(ProbeOutput::new("", banner))
    }

    fn realize(&self, command: String, executable: &Path) -> Result<ProbeOutput, ProbeError> {
        match self {
            ProbeStep::Output(output) => Ok(output.clone()),
            ProbeStep::Timeout => Err(ProbeError::Timeout {
                command,
                timeout: Duration::from_secs(10),
            }),
            ProbeStep::Io(kind) => Err(ProbeError::Io {
                command,
                source: io::Error::from(*kind),
            }),
            ProbeStep::Missing => Err(ProbeError::MissingExecutable {
                path: executable.to_path_buf(),
            }),
        }
    }
}

#[derive(Debug)]
struct ScriptedCompiler {
    path: PathBuf,
    steps: VecDeque<ProbeStep>,
}

/// Scripted [`Probe`] that records every call.
#[derive(Debug, Default)]
pub struct MockProbe {
    compilers: Mutex<HashMap<CompilerFamily, ScriptedCompiler>>,
    calls: Mutex<Vec<String>>,
}

impl MockProbe {
    pub fn new() -> Self {
        MockProbe::default()
    }

    /// A compiler that always prints `banner` on stdout.
    pub fn with_compiler(
        self,
        family: CompilerFamily,
        path: impl Into<PathBuf>,
        banner: &str,
    ) -> Self {
        self.with_script(family, path, vec![ProbeStep::output(banner)])
    }

    /// A compiler whose runs follow `steps`.
    pub fn with_script(
        self,
        family: CompilerFamily,
        path: impl Into<PathBuf>,
        steps: Vec<ProbeStep>,
    ) -> Self {
        self.replace_compiler(family, path, steps);
        self
    }

    /// Every call made so far, as `locate <family>` or `run <path>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of times a compiler was actually run.
    pub fn run_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("run "))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Point `family` at a different executable with a new script, as if
    /// the user had reconfigured or reinstalled it.
    pub fn replace_compiler(
        &self,
        family: CompilerFamily,
        path: impl Into<PathBuf>,
        steps: Vec<ProbeStep>,
    ) {
        self.compilers.lock().unwrap().insert(
            family,
            ScriptedCompiler {
                path: path.into(),
                steps: steps.into(),
            },
        );
    }
}

impl Probe for MockProbe {
    fn locate(&self, family: CompilerFamily) -> Result<PathBuf, ProbeError> {
        self.calls.lock().unwrap().push(format!("locate {}", family));

        match self.compilers.lock().unwrap().get(&family) {
            Some(compiler) => Ok(compiler.path.clone()),
            None => Err(ProbeError::NotFound {
                family,
                searched: family
                    .executable_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }

    fn run(&self, family: CompilerFamily, executable: &Path) -> Result<ProbeOutput, ProbeError> {
        let command = format!("{} {}", executable.display(), family.version_args().join(" "))
            .trim_end()
            .to_string();
        self.calls
            .lock()
            .unwrap()
            .push(format!("run {}", executable.display()));

        let mut compilers = self.compilers.lock().unwrap();
        let Some(compiler) = compilers.get_mut(&family) else {
            return ProbeStep::Missing.realize(command, executable);
        };

        let step = if compiler.steps.len() > 1 {
            compiler.steps.pop_front()
        } else {
            compiler.steps.front().cloned()
        };

        match step {
            Some(step) => step.realize(command, executable),
            None => ProbeStep::Missing.realize(command, executable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_is_consumed_in_order() {
        let probe = MockProbe::new().with_script(
            CompilerFamily::Gcc,
            "/usr/bin/gcc",
            vec![ProbeStep::Timeout, ProbeStep::output(fixtures::GCC_13)],
        );
        let path = probe.locate(CompilerFamily::Gcc).unwrap();

        assert!(matches!(
            probe.run(CompilerFamily::Gcc, &path),
            Err(ProbeError::Timeout { .. })
        ));
        assert!(probe.run(CompilerFamily::Gcc, &path).is_ok());
        // The last step repeats.
        assert!(probe.run(CompilerFamily::Gcc, &path).is_ok());
        assert_eq!(probe.run_count(), 3);
    }

    #[test]
    fn test_unknown_family_is_not_found() {
        let probe = MockProbe::new();
        let err = probe.locate(CompilerFamily::Clang).unwrap_err();
        assert!(matches!(err, ProbeError::NotFound { .. }));
        assert_eq!(probe.calls(), vec!["locate clang".to_string()]);
    }
}
