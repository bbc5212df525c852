//! Resolution error types and diagnostics.

use std::path::PathBuf;

use thiserror::Error;

use crate::generator::GeneratorError;
use crate::retry::{RetryError, RetryStats};
use crate::toolchain::{CompilerFamily, Platform, ProbeError, UnknownNameError};
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::version::{CompilerVersion, VersionParseError};

/// The request itself cannot be satisfied, independent of what is installed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error(transparent)]
    Unsupported(#[from] GeneratorError),

    #[error(transparent)]
    UnknownName(#[from] UnknownNameError),
}

/// Error during toolchain resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("{compiler} {found} is older than the minimum supported version {minimum}")]
    Validation {
        platform: Platform,
        compiler: CompilerFamily,
        executable: PathBuf,
        found: CompilerVersion,
        minimum: CompilerVersion,
        output: String,
    },

    #[error("could not determine the version of {}: {source}", .executable.display())]
    Parse {
        platform: Platform,
        compiler: CompilerFamily,
        executable: PathBuf,
        #[source]
        source: VersionParseError,
    },

    #[error("failed to probe {compiler} on {platform}: {source}")]
    Probe {
        platform: Platform,
        compiler: CompilerFamily,
        #[source]
        source: ProbeError,
        attempts: u32,
        /// Retries were spent before giving up.
        exhausted: bool,
        stats: RetryStats,
    },
}

impl From<GeneratorError> for ResolveError {
    fn from(err: GeneratorError) -> Self {
        ResolveError::Configuration(err.into())
    }
}

impl From<UnknownNameError> for ResolveError {
    fn from(err: UnknownNameError) -> Self {
        ResolveError::Configuration(err.into())
    }
}

impl ResolveError {
    pub(crate) fn probe(
        platform: Platform,
        compiler: CompilerFamily,
        err: RetryError<ProbeError>,
        stats: RetryStats,
    ) -> Self {
        let attempts = err.attempts();
        let exhausted = err.is_exhausted();
        ResolveError::Probe {
            platform,
            compiler,
            source: err.into_source(),
            attempts,
            exhausted,
            stats,
        }
    }

    /// Whether retrying the whole resolution later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolveError::Probe { exhausted: true, .. })
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::Configuration(ConfigurationError::Unsupported(err)) => {
                Diagnostic::error(format!(
                    "no build generator supports `{}` on `{}`",
                    err.compiler, err.platform
                ))
                .with_context(format!(
                    "platform: {}, compiler: {}",
                    err.platform, err.compiler
                ))
                .with_suggestion(suggestions::LIST_GENERATORS)
            }

            ResolveError::Configuration(ConfigurationError::UnknownName(err)) => {
                Diagnostic::error(format!("unknown {} `{}`", err.kind, err.name))
                    .with_context(format!("valid values: {}", err.valid))
            }

            ResolveError::Validation {
                platform,
                compiler,
                executable,
                found,
                minimum,
                output,
            } => Diagnostic::error(format!(
                "{} {} is too old (minimum supported version is {})",
                compiler, found, minimum
            ))
            .with_location(executable)
            .with_context(format!("platform: {}, compiler: {}", platform, compiler))
            .with_context(format!("output: {}", output))
            .with_suggestion(format!("Install {} {} or newer", compiler, minimum))
            .with_suggestion(suggestions::CONFIGURE_OVERRIDE),

            ResolveError::Parse {
                platform,
                compiler,
                executable,
                source,
            } => Diagnostic::error(format!(
                "could not determine the {} version of `{}`",
                compiler,
                executable.display()
            ))
            .with_location(executable)
            .with_context(format!("platform: {}, compiler: {}", platform, compiler))
            .with_context(format!("output: {}", source.snippet()))
            .with_suggestion(format!(
                "Check that `{}` is a {} compiler",
                executable.display(),
                compiler
            ))
            .with_suggestion(suggestions::CONFIGURE_OVERRIDE),

            ResolveError::Probe {
                platform,
                compiler,
                source,
                attempts,
                stats,
                ..
            } => {
                let mut diag = Diagnostic::error(format!(
                    "failed to probe {} on {}",
                    compiler, platform
                ))
                .with_context(source.to_string());

                if *attempts > 1 {
                    diag = diag.with_context(format!(
                        "gave up after {} attempts ({:.1}s spent waiting)",
                        attempts,
                        stats.total_retry_time.as_secs_f64()
                    ));
                }

                match source {
                    ProbeError::NotFound { .. } | ProbeError::MissingExecutable { .. } => diag
                        .with_suggestion(suggestions::INSTALL_COMPILER)
                        .with_suggestion(suggestions::CONFIGURE_OVERRIDE),
                    ProbeError::Timeout { .. } => diag.with_suggestion(
                        "Raise `timeout` under [probe] in .pilot/config.toml",
                    ),
                    ProbeError::Io { .. } => diag,
                }
            }
        }
    }
}
