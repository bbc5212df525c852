//! `pilot cache` command
//!
//! Inspect and maintain the toolchain detection cache.

use std::io::IsTerminal;

use anyhow::Result;

use pilot::cache::{unix_now, CacheEntry};
use pilot::util::diagnostic::{self, Diagnostic};
use pilot::CompilerVersion;

use super::Context;
use crate::cli::{CacheArgs, CacheCommands};

pub fn execute(ctx: &Context, args: CacheArgs) -> Result<()> {
    match args.command {
        CacheCommands::Show => show(ctx),
        CacheCommands::Clear => clear(ctx),
        CacheCommands::Cleanup => cleanup(ctx),
        CacheCommands::Path => {
            println!("{}", ctx.cache_path()?.display());
            Ok(())
        }
    }
}

fn show(ctx: &Context) -> Result<()> {
    let cache = ctx.open_cache()?;
    let cache = cache.lock().unwrap_or_else(|e| e.into_inner());

    if let Some(err) = cache.load_error() {
        let diag = Diagnostic::warning("cache file could not be loaded and will be rebuilt")
            .with_context(err.to_string());
        diagnostic::emit(&diag, std::io::stderr().is_terminal());
    }

    println!("Cache file: {}", cache.path().display());
    println!("TTL:        {}s", cache.ttl().as_secs());
    println!();

    if cache.is_empty() {
        println!("  (none)");
        return Ok(());
    }

    let now = unix_now();
    let mut expired = 0;
    for (key, entry) in cache.entries() {
        let state = if cache.is_fresh(entry, now) {
            ""
        } else {
            expired += 1;
            " (expired)"
        };
        println!(
            "  {}  {}  {}{}",
            short_key(key),
            describe(entry),
            format_age(now - entry.timestamp),
            state
        );
    }

    if expired > 0 {
        let diag = Diagnostic::note(format!("{} expired entr{}", expired, plural_y(expired)))
            .with_suggestion("Run `pilot cache cleanup` to remove them");
        diagnostic::emit(&diag, std::io::stderr().is_terminal());
    }

    Ok(())
}

/// First twelve characters of a cache key.
fn short_key(key: &str) -> String {
    key.chars().take(12).collect()
}

fn plural_y(n: usize) -> &'static str {
    if n == 1 {
        "y"
    } else {
        "ies"
    }
}

/// One-line summary of a cached resolution.
fn describe(entry: &CacheEntry) -> String {
    let descriptor = &entry.value["descriptor"];
    let family = descriptor["family"].as_str().unwrap_or("?");
    let version = serde_json::from_value::<CompilerVersion>(descriptor["version"].clone())
        .map(|v| v.to_string())
        .unwrap_or_else(|_| "?".to_string());
    let path = descriptor["executable_path"].as_str().unwrap_or("?");
    let generator = entry.value["generator"].as_str().unwrap_or("?");

    format!("{} {} at {} [{}]", family, version, path, generator)
}

fn format_age(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

fn clear(ctx: &Context) -> Result<()> {
    let cache = ctx.open_cache()?;
    let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());

    let count = cache.len();
    cache.clear()?;
    eprintln!("{:>12} {} cached toolchain(s)", "Removed", count);

    Ok(())
}

fn cleanup(ctx: &Context) -> Result<()> {
    let cache = ctx.open_cache()?;
    let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());

    let removed = cache.cleanup_expired()?;
    eprintln!("{:>12} {} expired entr{}", "Removed", removed, plural_y(removed));

    Ok(())
}
