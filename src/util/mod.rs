//! Shared utilities

pub mod config;
pub mod diagnostic;
pub mod hash;
pub mod process;

pub use config::PilotConfig;
pub use diagnostic::Diagnostic;
