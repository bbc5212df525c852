//! Minimum-version policy and plausibility checks.

use std::fmt;

use super::CompilerVersion;
use crate::toolchain::CompilerFamily;

/// Majors or minors above this are suspicious.
const MAX_PLAUSIBLE_COMPONENT: u32 = 100;

/// Patch numbers above this are suspicious. MSVC patches exceed 30000.
const MAX_PLAUSIBLE_PATCH: u32 = 100_000;

/// The oldest version of each family the engine will certify.
pub fn minimum_version(family: CompilerFamily) -> CompilerVersion {
    match family {
        CompilerFamily::Msvc => CompilerVersion::new(19, 30, 0),
        CompilerFamily::MsvcClang | CompilerFamily::MingwClang | CompilerFamily::Clang => {
            CompilerVersion::new(16, 0, 0)
        }
        CompilerFamily::MingwGcc | CompilerFamily::Gcc => CompilerVersion::new(11, 0, 0),
    }
}

/// Whether `version` meets the family's minimum.
pub fn is_supported(version: &CompilerVersion, family: CompilerFamily) -> bool {
    version.compare_signum(&minimum_version(family)) >= 0
}

/// A non-fatal observation about a parsed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionWarning {
    ImplausibleMajor(u32),
    ImplausibleMinor(u32),
    ImplausiblePatch(u32),
}

impl fmt::Display for VersionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionWarning::ImplausibleMajor(n) => {
                write!(f, "major version {} exceeds {}", n, MAX_PLAUSIBLE_COMPONENT)
            }
            VersionWarning::ImplausibleMinor(n) => {
                write!(f, "minor version {} exceeds {}", n, MAX_PLAUSIBLE_COMPONENT)
            }
            VersionWarning::ImplausiblePatch(n) => {
                write!(f, "patch version {} exceeds {}", n, MAX_PLAUSIBLE_PATCH)
            }
        }
    }
}

/// Result of [`validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub warnings: Vec<VersionWarning>,
}

impl ValidationReport {
    /// True when nothing looked off.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Flag implausible magnitudes.
///
/// Components are unsigned, so negative values cannot reach this point.
/// Warnings never make a version invalid.
pub fn validate(version: &CompilerVersion) -> ValidationReport {
    let mut warnings = Vec::new();

    if version.major > MAX_PLAUSIBLE_COMPONENT {
        warnings.push(VersionWarning::ImplausibleMajor(version.major));
    }
    if version.minor > MAX_PLAUSIBLE_COMPONENT {
        warnings.push(VersionWarning::ImplausibleMinor(version.minor));
    }
    if version.patch > MAX_PLAUSIBLE_PATCH {
        warnings.push(VersionWarning::ImplausiblePatch(version.patch));
    }

    ValidationReport { warnings }
}
