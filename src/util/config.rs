//! Configuration file support for pilot.
//!
//! pilot reads two configuration files:
//! - Global: `~/.pilot/config.toml` - User-wide defaults
//! - Project: `.pilot/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, field by field.
//!
//! ```toml
//! [cache]
//! path = "/tmp/toolchains.json"
//! ttl = 86400
//!
//! [retry]
//! max_retries = 3
//! initial_delay = 1.0
//! backoff_factor = 2.0
//!
//! [probe]
//! timeout = 10
//!
//! [compilers]
//! gcc = "/usr/bin/gcc-13"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL;
use crate::retry::RetryConfig;
use crate::toolchain::{CompilerFamily, DEFAULT_PROBE_TIMEOUT};

/// File name of the detection cache inside the cache directory.
pub const CACHE_FILE_NAME: &str = "toolchains.json";

/// pilot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub cache: CacheConfig,
    pub retry: RetrySettings,
    pub probe: ProbeConfig,

    /// Explicit compiler executables, keyed by family name.
    pub compilers: BTreeMap<String, PathBuf>,
}

/// Detection cache settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache file location (None = platform cache directory)
    pub path: Option<PathBuf>,

    /// Entry lifetime in seconds
    pub ttl: Option<u64>,
}

/// Retry settings for compiler probes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: Option<u32>,

    /// Seconds before the first retry
    pub initial_delay: Option<f64>,

    pub backoff_factor: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Seconds a single version probe may run
    pub timeout: Option<u64>,
}

impl PilotConfig {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let mut config: PilotConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.normalize_compilers();
        Ok(config)
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: PilotConfig) {
        if other.cache.path.is_some() {
            self.cache.path = other.cache.path.clone();
        }
        if other.cache.ttl.is_some() {
            self.cache.ttl = other.cache.ttl;
        }

        if other.retry.max_retries.is_some() {
            self.retry.max_retries = other.retry.max_retries;
        }
        if other.retry.initial_delay.is_some() {
            self.retry.initial_delay = other.retry.initial_delay;
        }
        if other.retry.backoff_factor.is_some() {
            self.retry.backoff_factor = other.retry.backoff_factor;
        }

        if other.probe.timeout.is_some() {
            self.probe.timeout = other.probe.timeout;
        }

        let mut other = other;
        other.normalize_compilers();
        self.normalize_compilers();
        self.compilers.extend(other.compilers);
    }

    /// Rewrite `[compilers]` keys to canonical family names, so `GCC` and
    /// `gcc` name the same entry. Unknown names are kept as written.
    fn normalize_compilers(&mut self) {
        let compilers = std::mem::take(&mut self.compilers);
        for (name, path) in compilers {
            let key = match name.parse::<CompilerFamily>() {
                Ok(family) => family.as_str().to_string(),
                Err(_) => name,
            };
            self.compilers.insert(key, path);
        }
    }

    /// Effective retry configuration.
    pub fn retry_config(&self) -> RetryConfig {
        let mut config = RetryConfig::default();
        if let Some(max_retries) = self.retry.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(delay) = self.retry.initial_delay {
            match Duration::try_from_secs_f64(delay) {
                Ok(delay) => config.initial_delay = delay,
                Err(_) => tracing::warn!("Ignoring invalid retry.initial_delay = {}", delay),
            }
        }
        if let Some(factor) = self.retry.backoff_factor {
            if factor.is_finite() && factor >= 1.0 {
                config.backoff_factor = factor;
            } else {
                tracing::warn!("Ignoring invalid retry.backoff_factor = {}", factor);
            }
        }
        config
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache.ttl.map(Duration::from_secs).unwrap_or(DEFAULT_TTL)
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT)
    }

    /// Cache file location, if one is configured or derivable.
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache.path.clone().or_else(default_cache_path)
    }

    /// Explicit executable configured for a family.
    ///
    /// Agrees with [`compiler_overrides`](Self::compiler_overrides) when
    /// several spellings of one family are present: the last one wins.
    pub fn compiler_override(&self, family: CompilerFamily) -> Option<&Path> {
        self.compiler_overrides()
            .filter(|(f, _)| *f == family)
            .last()
            .map(|(_, path)| path)
    }

    /// Families with an override, skipping unknown names.
    pub fn compiler_overrides(&self) -> impl Iterator<Item = (CompilerFamily, &Path)> {
        self.compilers.iter().filter_map(|(name, path)| match name.parse::<CompilerFamily>() {
            Ok(family) => Some((family, path.as_path())),
            Err(e) => {
                tracing::warn!("Ignoring [compilers] entry: {}", e);
                None
            }
        })
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.pilot/config.toml)
/// 2. Global config (~/.pilot/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> PilotConfig {
    let mut config = PilotConfig::default();

    if let Some(global_path) = global_path {
        config.merge(PilotConfig::load_or_default(global_path));
    }

    config.merge(PilotConfig::load_or_default(project_path));

    config
}

/// Get the global pilot config directory (~/.pilot).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".pilot"))
}

/// Get the global config path (~/.pilot/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.pilot/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".pilot").join("config.toml")
}

/// Default cache file in the platform cache directory.
pub fn default_cache_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pilot")
        .map(|dirs| dirs.cache_dir().join(CACHE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = PilotConfig::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(86400));
        assert_eq!(config.probe_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry_config(), RetryConfig::default());
        assert!(config.compiler_override(CompilerFamily::Gcc).is_none());
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[cache]
path = "/tmp/pilot/toolchains.json"
ttl = 600

[retry]
max_retries = 5
initial_delay = 0.25

[probe]
timeout = 30

[compilers]
gcc = "/usr/bin/gcc-13"
clang-cl = "C:/LLVM/bin/clang-cl.exe"
"#,
        )
        .unwrap();

        let config = PilotConfig::load(&config_path).unwrap();
        assert_eq!(
            config.cache_path(),
            Some(PathBuf::from("/tmp/pilot/toolchains.json"))
        );
        assert_eq!(config.cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.probe_timeout(), Duration::from_secs(30));

        let retry = config.retry_config();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(250));
        assert_eq!(retry.backoff_factor, 2.0);

        assert_eq!(
            config.compiler_override(CompilerFamily::Gcc),
            Some(Path::new("/usr/bin/gcc-13"))
        );
        assert_eq!(
            config.compiler_override(CompilerFamily::MsvcClang),
            Some(Path::new("C:/LLVM/bin/clang-cl.exe"))
        );
    }

    #[test]
    fn test_config_merge() {
        let mut base = PilotConfig::default();
        base.cache.ttl = Some(100);
        base.retry.max_retries = Some(1);
        base.compilers.insert("gcc".into(), PathBuf::from("/opt/gcc"));

        let mut project = PilotConfig::default();
        project.retry.max_retries = Some(7);
        project
            .compilers
            .insert("clang".into(), PathBuf::from("/opt/clang"));

        base.merge(project);

        assert_eq!(base.cache.ttl, Some(100));
        assert_eq!(base.retry.max_retries, Some(7));
        assert_eq!(base.compilers.len(), 2);
    }

    #[test]
    fn test_compiler_keys_are_case_insensitive() {
        let mut global = PilotConfig::default();
        global.compilers.insert("GCC".into(), PathBuf::from("/a/gcc"));

        let mut project = PilotConfig::default();
        project.compilers.insert("gcc".into(), PathBuf::from("/b/gcc"));

        global.merge(project);

        assert_eq!(global.compilers.len(), 1);
        assert_eq!(
            global.compiler_override(CompilerFamily::Gcc),
            Some(Path::new("/b/gcc"))
        );
        let all: Vec<_> = global.compiler_overrides().collect();
        assert_eq!(all, vec![(CompilerFamily::Gcc, Path::new("/b/gcc"))]);
    }

    #[test]
    fn test_load_normalizes_compiler_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[compilers]\nClang = \"/opt/clang\"\nicc = \"/opt/icc\"\n",
        )
        .unwrap();

        let config = PilotConfig::load(&path).unwrap();
        assert!(config.compilers.contains_key("clang"));
        assert!(config.compilers.contains_key("icc"));
        assert_eq!(
            config.compiler_override(CompilerFamily::Clang),
            Some(Path::new("/opt/clang"))
        );
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project_root = tmp.path().join("project");
        let project = project_config_path(&project_root);

        std::fs::write(&global, "[probe]\ntimeout = 5\n[cache]\nttl = 60\n").unwrap();
        std::fs::create_dir_all(project.parent().unwrap()).unwrap();
        std::fs::write(&project, "[probe]\ntimeout = 20\n").unwrap();

        let config = load_config(Some(&global), &project);
        assert_eq!(config.probe_timeout(), Duration::from_secs(20));
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_malformed_config_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[probe\ntimeout = ").unwrap();

        let config = PilotConfig::load_or_default(&path);
        assert!(config.probe.timeout.is_none());
    }

    #[test]
    fn test_invalid_backoff_is_ignored() {
        let mut config = PilotConfig::default();
        config.retry.backoff_factor = Some(0.5);
        config.retry.initial_delay = Some(-1.0);

        assert_eq!(config.retry_config(), RetryConfig::default());
    }

    #[test]
    fn test_unknown_compiler_names_are_skipped() {
        let mut config = PilotConfig::default();
        config.compilers.insert("icc".into(), PathBuf::from("/opt/icc"));
        config.compilers.insert("gcc".into(), PathBuf::from("/opt/gcc"));

        let overrides: Vec<_> = config.compiler_overrides().collect();
        assert_eq!(overrides, vec![(CompilerFamily::Gcc, Path::new("/opt/gcc"))]);
    }
}
