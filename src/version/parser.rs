//! Version extraction from compiler banners.
//!
//! Extraction happens in two stages. First, the family's patterns are run in
//! declared order against the full probe output and the first capture wins.
//! Second, the captured substring goes through a fixed cascade of formats:
//!
//! 1. `major.minor.patch.build`
//! 2. `major.minor.patch`
//! 3. `major.minor` (patch = 0)
//! 4. `major` (minor = patch = 0)

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::CompilerVersion;
use crate::toolchain::CompilerFamily;

/// Longest output excerpt carried in an error.
const SNIPPET_LEN: usize = 200;

/// Error when no version can be recovered from probe output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("no {family} version pattern matched the compiler output")]
    NoMatch {
        family: CompilerFamily,
        snippet: String,
    },

    #[error("`{text}` is not a recognizable version")]
    Malformed { text: String },
}

impl VersionParseError {
    /// A short excerpt of the offending text, for diagnostics.
    pub fn snippet(&self) -> &str {
        match self {
            VersionParseError::NoMatch { snippet, .. } => snippet,
            VersionParseError::Malformed { text } => text,
        }
    }
}

/// Version substring: one to four dot-separated integers.
macro_rules! version_capture {
    ($prefix:literal) => {
        concat!($prefix, r"(\d+(?:\.\d+){0,3})")
    };
}

/// The accepted formats, most specific first.
static FORMATS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        Regex::new(r"^(\d+)\.(\d+)\.(\d+)\.(\d+)$").expect("valid regex"),
        Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").expect("valid regex"),
        Regex::new(r"^(\d+)\.(\d+)$").expect("valid regex"),
        Regex::new(r"^(\d+)$").expect("valid regex"),
    ]
});

static MSVC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        version_capture!(r"Optimizing Compiler Version\s+"),
        version_capture!(r"Version\s+"),
    ])
});

static CLANG_CL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        version_capture!(r"clang version\s+"),
        version_capture!(r"LLVM version\s+"),
    ])
});

static MINGW_GCC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        version_capture!(r"(?:gcc|g\+\+)(?:\.exe)?\s+\([^)]*\)\s+"),
        version_capture!(r"\(GCC\)\s+"),
        version_capture!(r"gcc version\s+"),
    ])
});

static MINGW_CLANG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        version_capture!(r"clang version\s+"),
        version_capture!(r"LLVM version\s+"),
    ])
});

static GCC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        version_capture!(r"(?:gcc|g\+\+|cc)(?:-\d+)?\s+\([^)]*\)\s+"),
        version_capture!(r"\(GCC\)\s+"),
        version_capture!(r"gcc version\s+"),
    ])
});

static CLANG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        version_capture!(r"clang version\s+"),
        version_capture!(r"LLVM version\s+"),
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
}

/// Parse a bare version string through the four-format cascade.
pub fn parse_version_string(text: &str) -> Result<CompilerVersion, VersionParseError> {
    let text = text.trim();
    let malformed = || VersionParseError::Malformed {
        text: text.to_string(),
    };

    for (index, format) in FORMATS.iter().enumerate() {
        let Some(caps) = format.captures(text) else {
            continue;
        };

        let number = |i: usize| -> Result<u32, VersionParseError> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().map_err(|_| malformed()),
                None => Ok(0),
            }
        };

        let mut version = CompilerVersion::new(number(1)?, number(2)?, number(3)?);
        if index == 0 {
            version = version.with_build(&caps[4]);
        }
        return Ok(version.with_raw_text(text));
    }

    Err(malformed())
}

/// Family-aware parser for compiler probe output.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionParser;

impl VersionParser {
    /// The ordered extraction patterns for a family.
    pub fn patterns(family: CompilerFamily) -> &'static [Regex] {
        match family {
            CompilerFamily::Msvc => &MSVC_PATTERNS,
            CompilerFamily::MsvcClang => &CLANG_CL_PATTERNS,
            CompilerFamily::MingwGcc => &MINGW_GCC_PATTERNS,
            CompilerFamily::MingwClang => &MINGW_CLANG_PATTERNS,
            CompilerFamily::Gcc => &GCC_PATTERNS,
            CompilerFamily::Clang => &CLANG_PATTERNS,
        }
    }

    /// Find the version substring in probe output.
    pub fn extract(family: CompilerFamily, output: &str) -> Option<&str> {
        Self::patterns(family)
            .iter()
            .find_map(|re| re.captures(output))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Parse the version out of the combined stdout+stderr of a probe.
    pub fn parse(family: CompilerFamily, output: &str) -> Result<CompilerVersion, VersionParseError> {
        let Some(text) = Self::extract(family, output) else {
            return Err(VersionParseError::NoMatch {
                family,
                snippet: snippet(output),
            });
        };

        tracing::debug!("Extracted {} version text `{}`", family, text);
        parse_version_string(text)
    }
}

/// Truncate output to a single-line excerpt for error messages.
pub(crate) fn snippet(output: &str) -> String {
    let flat: String = output
        .trim()
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    match flat.char_indices().nth(SNIPPET_LEN) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
