//! Toolchain vocabulary: compiler families, platforms and resolved records.
//!
//! A [`ToolchainDescriptor`] is produced by one successful probe and parse
//! cycle. A [`ToolchainConfiguration`] adds the generator choice and is what
//! callers of the resolver receive.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::version::CompilerVersion;

mod probe;

pub use probe::{ProbeError, ProbeOutput, ProcessProbe, Probe, DEFAULT_PROBE_TIMEOUT};

/// The family of a C/C++ compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompilerFamily {
    /// Microsoft Visual C++ (cl.exe)
    Msvc,
    /// Clang with the MSVC driver (clang-cl.exe)
    MsvcClang,
    /// GCC targeting MinGW-w64
    MingwGcc,
    /// Clang targeting MinGW-w64
    MingwClang,
    /// GCC (GNU Compiler Collection)
    Gcc,
    /// Clang/LLVM, including Apple Clang
    Clang,
}

impl CompilerFamily {
    /// Every family, in declaration order.
    pub const ALL: [CompilerFamily; 6] = [
        CompilerFamily::Msvc,
        CompilerFamily::MsvcClang,
        CompilerFamily::MingwGcc,
        CompilerFamily::MingwClang,
        CompilerFamily::Gcc,
        CompilerFamily::Clang,
    ];

    /// Get the family name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerFamily::Msvc => "msvc",
            CompilerFamily::MsvcClang => "msvc-clang",
            CompilerFamily::MingwGcc => "mingw-gcc",
            CompilerFamily::MingwClang => "mingw-clang",
            CompilerFamily::Gcc => "gcc",
            CompilerFamily::Clang => "clang",
        }
    }

    /// Executable names searched on PATH, most specific first.
    pub fn executable_names(&self) -> &'static [&'static str] {
        match self {
            CompilerFamily::Msvc => &["cl"],
            CompilerFamily::MsvcClang => &["clang-cl"],
            CompilerFamily::MingwGcc => &["x86_64-w64-mingw32-gcc", "gcc"],
            CompilerFamily::MingwClang => &["x86_64-w64-mingw32-clang", "clang"],
            CompilerFamily::Gcc => &["gcc"],
            CompilerFamily::Clang => &["clang"],
        }
    }

    /// Arguments passed when probing for a version.
    ///
    /// `cl.exe` prints its banner to stderr when invoked bare and rejects
    /// `--version`.
    pub fn version_args(&self) -> &'static [&'static str] {
        match self {
            CompilerFamily::Msvc => &[],
            _ => &["--version"],
        }
    }
}

impl fmt::Display for CompilerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CompilerFamily {
    type Err = UnknownNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "msvc" | "cl" => Ok(CompilerFamily::Msvc),
            "msvc-clang" | "clang-cl" => Ok(CompilerFamily::MsvcClang),
            "mingw-gcc" | "mingw" => Ok(CompilerFamily::MingwGcc),
            "mingw-clang" => Ok(CompilerFamily::MingwClang),
            "gcc" => Ok(CompilerFamily::Gcc),
            "clang" => Ok(CompilerFamily::Clang),
            _ => Err(UnknownNameError {
                kind: "compiler",
                name: s.to_string(),
                valid: "msvc, msvc-clang, mingw-gcc, mingw-clang, gcc, clang",
            }),
        }
    }
}

/// The operating system a toolchain is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    Macos,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Windows, Platform::Linux, Platform::Macos];

    /// Get the platform name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Macos => "macos",
        }
    }

    /// The platform this binary was compiled for.
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = UnknownNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "windows" | "win32" | "win64" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "macos" | "darwin" | "osx" => Ok(Platform::Macos),
            _ => Err(UnknownNameError {
                kind: "platform",
                name: s.to_string(),
                valid: "windows, linux, macos",
            }),
        }
    }
}

/// CMake-style build configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildType {
    #[default]
    Debug,
    Release,
    RelWithDebInfo,
    MinSizeRel,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Debug => "Debug",
            BuildType::Release => "Release",
            BuildType::RelWithDebInfo => "RelWithDebInfo",
            BuildType::MinSizeRel => "MinSizeRel",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BuildType {
    type Err = UnknownNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(BuildType::Debug),
            "release" => Ok(BuildType::Release),
            "relwithdebinfo" => Ok(BuildType::RelWithDebInfo),
            "minsizerel" => Ok(BuildType::MinSizeRel),
            _ => Err(UnknownNameError {
                kind: "build type",
                name: s.to_string(),
                valid: "Debug, Release, RelWithDebInfo, MinSizeRel",
            }),
        }
    }
}

/// Error returned when parsing an unknown compiler, platform or build type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNameError {
    pub kind: &'static str,
    pub name: String,
    pub valid: &'static str,
}

impl fmt::Display for UnknownNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} '{}', valid values: {}",
            self.kind, self.name, self.valid
        )
    }
}

impl std::error::Error for UnknownNameError {}

/// A compiler whose identity and version have been established by a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolchainDescriptor {
    pub family: CompilerFamily,
    pub executable_path: PathBuf,
    pub version: CompilerVersion,
    /// Combined stdout+stderr of the version probe.
    pub raw_output: String,
}

/// The certified result of a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolchainConfiguration {
    pub descriptor: ToolchainDescriptor,
    /// Build-file generator to configure with (e.g. `Ninja`).
    pub generator: String,
    pub resolved_from_cache: bool,
}
