//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use pilot::{BuildType, CompilerFamily, Platform};

/// pilot - Resolve and certify C/C++ compiler toolchains
#[derive(Parser)]
#[command(name = "pilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Use this detection cache file instead of the configured one
    #[arg(long, global = true, value_name = "PATH", env = "PILOT_CACHE")]
    pub cache: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a compiler toolchain and its build generator
    Resolve(ResolveArgs),

    /// Inspect and maintain the detection cache
    Cache(CacheArgs),

    /// Show which build generators each platform/compiler pair supports
    Generators(GeneratorsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Compiler family (msvc, msvc-clang, mingw-gcc, mingw-clang, gcc, clang)
    pub compiler: CompilerFamily,

    /// Target platform (defaults to the host)
    #[arg(long)]
    pub platform: Option<Platform>,

    /// Build configuration
    #[arg(long, default_value = "Debug")]
    pub build_type: BuildType,

    /// Prefer a multi-config generator
    #[arg(long)]
    pub multi_config: bool,

    /// Ignore cached results and probe the compiler again
    #[arg(long)]
    pub refresh: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cached toolchains
    Show,

    /// Remove every cached toolchain
    Clear,

    /// Remove expired entries
    Cleanup,

    /// Print the cache file location
    Path,
}

#[derive(Args)]
pub struct GeneratorsArgs {
    /// Only show this platform
    #[arg(long)]
    pub platform: Option<Platform>,

    /// Only show this compiler
    #[arg(long)]
    pub compiler: Option<CompilerFamily>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
