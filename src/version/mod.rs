//! Compiler version model.
//!
//! Compiler versions are not semver: MSVC reports four components
//! (`19.40.33807.0`), GCC sometimes only two (`13.2`). A [`CompilerVersion`]
//! keeps the three numeric components that participate in ordering and keeps
//! an optional fourth component as an informational build string.
//!
//! Ordering and equality consider `(major, minor, patch)` only. The build
//! string and the raw text the version was parsed from never participate.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

mod parser;
mod policy;

pub(crate) use parser::snippet;
pub use parser::{parse_version_string, VersionParseError, VersionParser};
pub use policy::{is_supported, minimum_version, validate, ValidationReport, VersionWarning};

/// A compiler version as reported by a version probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Fourth dot-separated component, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    /// The substring this version was parsed from.
    #[serde(default)]
    pub raw_text: String,
}

impl CompilerVersion {
    /// Create a version with no build component.
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        CompilerVersion {
            major,
            minor,
            patch,
            build: None,
            raw_text: format!("{}.{}.{}", major, minor, patch),
        }
    }

    /// Attach a build component.
    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = Some(build.into());
        self
    }

    /// Record the text this version came from.
    pub fn with_raw_text(mut self, raw: impl Into<String>) -> Self {
        self.raw_text = raw.into();
        self
    }

    /// The `(major, minor, patch)` triple used for ordering.
    pub fn triple(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }

    /// Compare two versions by `(major, minor, patch)`.
    ///
    /// `build` never participates.
    pub fn compare(&self, other: &CompilerVersion) -> Ordering {
        self.triple().cmp(&other.triple())
    }

    /// Three-way comparison as -1, 0 or 1.
    pub fn compare_signum(&self, other: &CompilerVersion) -> i8 {
        match self.compare(other) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }
}

impl PartialEq for CompilerVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for CompilerVersion {}

impl PartialOrd for CompilerVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for CompilerVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for CompilerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref build) = self.build {
            write!(f, ".{}", build)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for CompilerVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_version_string(s)
    }
}
