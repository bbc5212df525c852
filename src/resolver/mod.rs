//! Toolchain resolution.
//!
//! A resolution either returns a cached configuration or walks the full
//! pipeline:
//!
//! ```text
//! lookup -> probe (retried) -> parse -> validate -> select generator -> store
//! ```
//!
//! Parse and validation failures are never retried: a compiler that ran and
//! printed something unrecognizable will print the same thing next time.
//! Nothing is written to the cache unless every stage succeeded.
//!
//! Resolutions that share a cache key are serialized, so a second caller
//! waiting on the first sees its cache write instead of probing again.

pub mod errors;

pub use errors::{ConfigurationError, ResolveError};

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DetectionCache;
use crate::generator::GeneratorSelector;
use crate::retry::{RetryConfig, RetryExecutor, RetryStats};
use crate::toolchain::{
    BuildType, CompilerFamily, Platform, Probe, ProbeError, ProbeOutput, ProcessProbe,
    ToolchainConfiguration, ToolchainDescriptor,
};
use crate::util::config::PilotConfig;
use crate::util::hash::Fingerprint;
use crate::version::{self, VersionParser};

/// Cache key for a resolution.
///
/// The build type does not take part: it never changes the generator choice.
pub fn cache_key(platform: Platform, compiler: CompilerFamily, multi_config: bool) -> String {
    let mut fp = Fingerprint::new();
    fp.update_str(platform.as_str())
        .update_str(compiler.as_str())
        .update_bool(multi_config);
    fp.finish()
}

/// Parameters of a single resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveRequest {
    pub platform: Platform,
    pub compiler: CompilerFamily,
    pub build_type: BuildType,
    /// Prefer a generator that handles several configurations at once.
    pub multi_config: bool,
    /// Skip the cache lookup. The result is still written back.
    pub force_refresh: bool,
}

impl ResolveRequest {
    pub fn new(platform: Platform, compiler: CompilerFamily) -> Self {
        ResolveRequest {
            platform,
            compiler,
            build_type: BuildType::default(),
            multi_config: false,
            force_refresh: false,
        }
    }

    pub fn build_type(mut self, build_type: BuildType) -> Self {
        self.build_type = build_type;
        self
    }

    pub fn multi_config(mut self, multi_config: bool) -> Self {
        self.multi_config = multi_config;
        self
    }

    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn cache_key(&self) -> String {
        cache_key(self.platform, self.compiler, self.multi_config)
    }
}

/// What is stored in the detection cache for one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedToolchain {
    descriptor: ToolchainDescriptor,
    generator: String,
}

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Resolves compiler toolchains, probing only when the cache cannot answer.
pub struct ToolchainResolver<P: Probe> {
    probe: P,
    selector: GeneratorSelector,
    retry: RetryConfig,
    cache: Arc<Mutex<DetectionCache>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: Mutex<RetryStats>,
    sleeper: Sleeper,
}

impl<P: Probe + fmt::Debug> fmt::Debug for ToolchainResolver<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolchainResolver")
            .field("probe", &self.probe)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ToolchainResolver<ProcessProbe> {
    /// Resolver over real subprocesses, configured from `config`.
    pub fn from_config(config: &PilotConfig, cache: Arc<Mutex<DetectionCache>>) -> Self {
        let probe = config
            .compiler_overrides()
            .fold(ProcessProbe::new(config.probe_timeout()), |probe, (family, path)| {
                probe.with_override(family, path)
            });

        ToolchainResolver::new(probe, cache).with_retry_config(config.retry_config())
    }
}

impl<P: Probe> ToolchainResolver<P> {
    pub fn new(probe: P, cache: Arc<Mutex<DetectionCache>>) -> Self {
        ToolchainResolver {
            probe,
            selector: GeneratorSelector::builtin(),
            retry: RetryConfig::default(),
            cache,
            in_flight: Mutex::new(HashMap::new()),
            stats: Mutex::new(RetryStats::default()),
            sleeper: Arc::new(std::thread::sleep),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_selector(mut self, selector: GeneratorSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Replace the function used to wait between probe attempts.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn selector(&self) -> &GeneratorSelector {
        &self.selector
    }

    pub fn cache(&self) -> &Arc<Mutex<DetectionCache>> {
        &self.cache
    }

    /// Retry counters accumulated over every resolution so far.
    pub fn retry_stats(&self) -> RetryStats {
        lock(&self.stats).clone()
    }

    /// Resolve a toolchain with default options.
    pub fn resolve(
        &self,
        platform: Platform,
        compiler: CompilerFamily,
        build_type: Option<BuildType>,
    ) -> Result<ToolchainConfiguration, ResolveError> {
        let request =
            ResolveRequest::new(platform, compiler).build_type(build_type.unwrap_or_default());
        self.resolve_with(&request)
    }

    /// Resolve from user-supplied names, e.g. `("linux", "clang", Some("Release"))`.
    pub fn resolve_named(
        &self,
        platform: &str,
        compiler: &str,
        build_type: Option<&str>,
    ) -> Result<ToolchainConfiguration, ResolveError> {
        let platform: Platform = platform.parse()?;
        let compiler: CompilerFamily = compiler.parse()?;
        let build_type = build_type.map(str::parse::<BuildType>).transpose()?;
        self.resolve(platform, compiler, build_type)
    }

    pub fn resolve_with(
        &self,
        request: &ResolveRequest,
    ) -> Result<ToolchainConfiguration, ResolveError> {
        let ResolveRequest {
            platform,
            compiler,
            build_type,
            multi_config,
            force_refresh,
        } = *request;

        // No probe is worth running for a pair nothing can build with.
        if !self.selector.supports(platform, compiler) {
            return Err(crate::generator::GeneratorError { platform, compiler }.into());
        }

        let key = request.cache_key();
        let key_lock = self.key_lock(&key);
        let _flight = lock(&key_lock);

        if !force_refresh {
            if let Some(cached) = self.lookup(&key) {
                if self.still_located(compiler, &key, &cached.descriptor) {
                    tracing::debug!("Using cached {} toolchain for {}", compiler, platform);
                    return Ok(ToolchainConfiguration {
                        descriptor: cached.descriptor,
                        generator: cached.generator,
                        resolved_from_cache: true,
                    });
                }
            }
        }

        tracing::debug!(
            "Resolving {} on {} ({}, multi-config: {})",
            compiler,
            platform,
            build_type,
            multi_config
        );

        let descriptor = self.detect(platform, compiler)?;
        let generator = self.selector.select(platform, compiler, multi_config)?;

        tracing::info!(
            "Resolved {} {} at {} (generator: {})",
            compiler,
            descriptor.version,
            descriptor.executable_path.display(),
            generator
        );

        self.store(&key, &descriptor, &generator);

        Ok(ToolchainConfiguration {
            descriptor,
            generator,
            resolved_from_cache: false,
        })
    }

    /// Forget the cached result for a request's key.
    pub fn invalidate(&self, request: &ResolveRequest) -> bool {
        match lock(&self.cache).invalidate(&request.cache_key()) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Failed to invalidate cached toolchain: {}", e);
                false
            }
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut in_flight = lock(&self.in_flight);
        Arc::clone(in_flight.entry(key.to_string()).or_default())
    }

    fn lookup(&self, key: &str) -> Option<CachedToolchain> {
        let mut cache = lock(&self.cache);
        let value = cache.get(key)?;

        match serde_json::from_value::<CachedToolchain>(value) {
            Ok(cached) => Some(cached),
            Err(e) => {
                tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                if let Err(e) = cache.invalidate(key) {
                    tracing::warn!("Failed to drop cache entry {}: {}", key, e);
                }
                None
            }
        }
    }

    /// Whether `compiler` still locates to the cached executable. A stale
    /// entry is dropped so the caller probes the compiler found now.
    fn still_located(
        &self,
        compiler: CompilerFamily,
        key: &str,
        cached: &ToolchainDescriptor,
    ) -> bool {
        match self.probe.locate(compiler) {
            Ok(path) if path == cached.executable_path => return true,
            Ok(path) => tracing::info!(
                "{} now locates to {} instead of cached {}, probing again",
                compiler,
                path.display(),
                cached.executable_path.display()
            ),
            Err(e) => tracing::debug!("Cached {} toolchain is gone: {}", compiler, e),
        }

        if let Err(e) = lock(&self.cache).invalidate(key) {
            tracing::warn!("Failed to drop cache entry {}: {}", key, e);
        }
        false
    }

    fn store(&self, key: &str, descriptor: &ToolchainDescriptor, generator: &str) {
        let record = CachedToolchain {
            descriptor: descriptor.clone(),
            generator: generator.to_string(),
        };
        if let Err(e) = lock(&self.cache).set(key, &record) {
            tracing::warn!("Failed to cache resolved toolchain: {}", e);
        }
    }

    /// Probe, parse and validate one compiler.
    fn detect(
        &self,
        platform: Platform,
        compiler: CompilerFamily,
    ) -> Result<ToolchainDescriptor, ResolveError> {
        let sleeper = Arc::clone(&self.sleeper);
        let mut executor = RetryExecutor::new(self.retry).with_sleeper(move |d| sleeper(d));

        let probed = executor.execute(|| -> Result<(PathBuf, ProbeOutput), ProbeError> {
            let executable = self.probe.locate(compiler)?;
            let output = self.probe.run(compiler, &executable)?;
            Ok((executable, output))
        });

        lock(&self.stats).merge(executor.stats());

        let (executable, output) = probed.map_err(|err| {
            ResolveError::probe(platform, compiler, err, executor.stats().clone())
        })?;

        let raw_output = output.combined();
        let found = VersionParser::parse(compiler, &raw_output).map_err(|source| {
            ResolveError::Parse {
                platform,
                compiler,
                executable: executable.clone(),
                source,
            }
        })?;

        for warning in version::validate(&found).warnings {
            tracing::warn!("{} at {}: {}", compiler, executable.display(), warning);
        }

        if !version::is_supported(&found, compiler) {
            return Err(ResolveError::Validation {
                platform,
                compiler,
                executable,
                found,
                minimum: version::minimum_version(compiler),
                output: version::snippet(&raw_output),
            });
        }

        Ok(ToolchainDescriptor {
            family: compiler,
            executable_path: executable,
            version: found,
            raw_output,
        })
    }
}
