//! Command implementations

pub mod cache;
pub mod completions;
pub mod generators;
pub mod resolve;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};

use pilot::util::config::{global_config_path, load_config, project_config_path};
use pilot::util::PilotConfig;
use pilot::DetectionCache;

use crate::cli::Cli;

/// Settings shared by every command.
pub struct Context {
    pub config: PilotConfig,
    cache_path: Option<PathBuf>,
}

impl Context {
    /// Load configuration for the current directory and apply CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let config = load_config(global_config_path().as_deref(), &project_config_path(&cwd));
        let cache_path = cli.cache.clone().or_else(|| config.cache_path());

        Ok(Context { config, cache_path })
    }

    pub fn cache_path(&self) -> Result<&Path> {
        self.cache_path.as_deref().context(
            "could not determine a cache directory; pass --cache or set [cache] path",
        )
    }

    pub fn open_cache(&self) -> Result<Arc<Mutex<DetectionCache>>> {
        let cache = DetectionCache::open(self.cache_path()?, self.config.cache_ttl());
        Ok(Arc::new(Mutex::new(cache)))
    }
}
