//! Build-generator selection.
//!
//! Which CMake generators work for a platform/compiler pair is a fixed fact
//! about the tools, captured in a capability table. Choosing among the
//! candidates is policy:
//!
//! 1. If multi-config output was requested and a `Multi-Config` generator is
//!    a candidate, use it.
//! 2. Otherwise take the first entry of [`PREFERENCE_ORDER`] that is a
//!    candidate.
//! 3. Otherwise take the first candidate.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::toolchain::{CompilerFamily, Platform};

pub const NINJA: &str = "Ninja";
pub const NINJA_MULTI_CONFIG: &str = "Ninja Multi-Config";
pub const UNIX_MAKEFILES: &str = "Unix Makefiles";
pub const MINGW_MAKEFILES: &str = "MinGW Makefiles";
pub const NMAKE_MAKEFILES: &str = "NMake Makefiles";
pub const VISUAL_STUDIO_2022: &str = "Visual Studio 17 2022";
pub const XCODE: &str = "Xcode";

/// Single-config generators, most preferred first.
pub const PREFERENCE_ORDER: &[&str] = &[NINJA, UNIX_MAKEFILES, MINGW_MAKEFILES, NMAKE_MAKEFILES];

/// Substrings that mark a generator as multi-config.
const MULTI_CONFIG_MARKERS: &[&str] = &["Visual Studio", "Xcode", "Multi-Config"];

/// The builtin capability table.
const CAPABILITIES: &[(Platform, CompilerFamily, &[&str])] = &[
    (
        Platform::Windows,
        CompilerFamily::Msvc,
        &[VISUAL_STUDIO_2022, NINJA, NINJA_MULTI_CONFIG, NMAKE_MAKEFILES],
    ),
    (
        Platform::Windows,
        CompilerFamily::MsvcClang,
        &[NINJA, NINJA_MULTI_CONFIG, VISUAL_STUDIO_2022],
    ),
    (
        Platform::Windows,
        CompilerFamily::MingwGcc,
        &[MINGW_MAKEFILES, NINJA, NINJA_MULTI_CONFIG],
    ),
    (
        Platform::Windows,
        CompilerFamily::MingwClang,
        &[MINGW_MAKEFILES, NINJA, NINJA_MULTI_CONFIG],
    ),
    (
        Platform::Linux,
        CompilerFamily::Gcc,
        &[UNIX_MAKEFILES, NINJA, NINJA_MULTI_CONFIG],
    ),
    (
        Platform::Linux,
        CompilerFamily::Clang,
        &[UNIX_MAKEFILES, NINJA, NINJA_MULTI_CONFIG],
    ),
    // Cross-compiling for Windows from Linux.
    (Platform::Linux, CompilerFamily::MingwGcc, &[UNIX_MAKEFILES, NINJA]),
    (Platform::Linux, CompilerFamily::MingwClang, &[UNIX_MAKEFILES, NINJA]),
    (
        Platform::Macos,
        CompilerFamily::Clang,
        &[XCODE, UNIX_MAKEFILES, NINJA, NINJA_MULTI_CONFIG],
    ),
    (Platform::Macos, CompilerFamily::Gcc, &[UNIX_MAKEFILES, NINJA]),
];

/// The platform/compiler pair has no known generator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no build generator supports compiler `{compiler}` on platform `{platform}`")]
pub struct GeneratorError {
    pub platform: Platform,
    pub compiler: CompilerFamily,
}

/// Whether a generator produces build files for several configurations at once.
pub fn is_multi_config(generator: &str) -> bool {
    MULTI_CONFIG_MARKERS.iter().any(|m| generator.contains(m))
}

/// Chooses a generator from a capability table.
#[derive(Debug, Clone)]
pub struct GeneratorSelector {
    table: BTreeMap<(Platform, CompilerFamily), Vec<String>>,
}

impl Default for GeneratorSelector {
    fn default() -> Self {
        GeneratorSelector::builtin()
    }
}

impl GeneratorSelector {
    /// Selector over the builtin table.
    pub fn builtin() -> Self {
        let table = CAPABILITIES
            .iter()
            .map(|(platform, compiler, generators)| {
                (
                    (*platform, *compiler),
                    generators.iter().map(|g| g.to_string()).collect(),
                )
            })
            .collect();
        GeneratorSelector { table }
    }

    /// Selector over a custom table.
    pub fn new(table: BTreeMap<(Platform, CompilerFamily), Vec<String>>) -> Self {
        GeneratorSelector { table }
    }

    /// Ordered candidates for a pair, if the pair is supported.
    pub fn candidates(&self, platform: Platform, compiler: CompilerFamily) -> Option<&[String]> {
        self.table
            .get(&(platform, compiler))
            .map(|v| v.as_slice())
            .filter(|v| !v.is_empty())
    }

    pub fn supports(&self, platform: Platform, compiler: CompilerFamily) -> bool {
        self.candidates(platform, compiler).is_some()
    }

    /// Every supported pair with its candidates, in table order.
    pub fn entries(&self) -> impl Iterator<Item = (Platform, CompilerFamily, &[String])> {
        self.table
            .iter()
            .map(|((platform, compiler), generators)| (*platform, *compiler, generators.as_slice()))
    }

    /// Pick the generator for a pair.
    pub fn select(
        &self,
        platform: Platform,
        compiler: CompilerFamily,
        multi_config: bool,
    ) -> Result<String, GeneratorError> {
        let candidates = self
            .candidates(platform, compiler)
            .ok_or(GeneratorError { platform, compiler })?;

        if multi_config {
            if let Some(generator) = candidates.iter().find(|g| g.contains("Multi-Config")) {
                return Ok(generator.clone());
            }
        }

        let preferred = PREFERENCE_ORDER
            .iter()
            .find(|p| candidates.iter().any(|c| c == *p))
            .map(|p| p.to_string());

        // Non-empty, checked by `candidates`.
        Ok(preferred.unwrap_or_else(|| candidates[0].clone()))
    }
}
