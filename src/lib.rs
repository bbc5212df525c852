//! pilot - C/C++ toolchain resolution
//!
//! This crate discovers installed compilers, determines their versions,
//! checks them against a minimum-version policy, picks a compatible build
//! generator and caches the result so repeated resolutions skip probing.

pub mod cache;
pub mod generator;
pub mod resolver;
pub mod retry;
pub mod toolchain;
pub mod util;
pub mod version;

/// Test utilities and mocks for pilot unit tests.
#[cfg(test)]
pub mod test_support;

pub use cache::DetectionCache;
pub use generator::GeneratorSelector;
pub use resolver::{ResolveError, ResolveRequest, ToolchainResolver};
pub use retry::{RetryConfig, RetryExecutor, RetryStats};
pub use toolchain::{
    BuildType, CompilerFamily, Platform, ToolchainConfiguration, ToolchainDescriptor,
};
pub use version::CompilerVersion;
