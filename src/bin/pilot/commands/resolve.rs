//! `pilot resolve` command

use anyhow::Result;
use serde::Serialize;

use pilot::{
    BuildType, Platform, ResolveRequest, ToolchainConfiguration, ToolchainResolver,
};

use super::Context;
use crate::cli::ResolveArgs;

#[derive(Serialize)]
struct Report<'a> {
    platform: Platform,
    build_type: BuildType,
    multi_config: bool,
    #[serde(flatten)]
    config: &'a ToolchainConfiguration,
}

pub fn execute(ctx: &Context, args: ResolveArgs) -> Result<()> {
    let platform = args.platform.unwrap_or_else(Platform::host);
    let request = ResolveRequest::new(platform, args.compiler)
        .build_type(args.build_type)
        .multi_config(args.multi_config)
        .force_refresh(args.refresh);

    let resolver = ToolchainResolver::from_config(&ctx.config, ctx.open_cache()?);
    let config = resolver.resolve_with(&request)?;

    let stats = resolver.retry_stats();
    if stats.total_attempts > 1 {
        tracing::debug!(
            "Probe took {} attempts ({:.1}s waiting)",
            stats.total_attempts,
            stats.total_retry_time.as_secs_f64()
        );
    }

    if args.json {
        let report = Report {
            platform,
            build_type: args.build_type,
            multi_config: args.multi_config,
            config: &config,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let descriptor = &config.descriptor;
    let source = if config.resolved_from_cache {
        " (cached)"
    } else {
        ""
    };

    println!(
        "{:>12} {} {}{}",
        "Resolved", descriptor.family, descriptor.version, source
    );
    println!("  path:       {}", descriptor.executable_path.display());
    println!("  generator:  {}", config.generator);
    println!("  platform:   {}", platform);
    println!("  build type: {}", args.build_type);

    Ok(())
}
