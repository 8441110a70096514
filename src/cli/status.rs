//! Status command implementation

use colored::Colorize;
use serde::Serialize;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::config::Config;
use crate::error::Result;
use crate::output::json::format_site_json;

#[derive(Debug, Serialize)]
struct StatusReport {
    config_path: String,
    origin: String,
    version: String,
    precache: String,
    runtime_cache: String,
    manifest_entries: usize,
    state: String,
    controller: Option<String>,
    cache_dir: Option<String>,
}

/// Run the status command to display configuration and worker status
pub fn run(opts: &GlobalOptions) -> Result<()> {
    let config_path = Config::resolve_path(opts.config_ref())?;

    if !config_path.exists() {
        if opts.format == OutputFormat::Json {
            return Err(crate::error::ConfigError::NotFound.into());
        }
        println!("{}\n", "sitecache status".bold());
        println!("{} Configuration not found", "✗".red());
        println!();
        println!(
            "Run {} to create a configuration file.",
            "sitecache init".cyan()
        );
        println!();
        return Ok(());
    }

    let ctx = CommandContext::new(opts)?;
    let controller = ctx.controller()?;
    let report = StatusReport {
        config_path: config_path.display().to_string(),
        origin: ctx.config.origin.clone(),
        version: ctx.config.version.clone(),
        precache: ctx.config.precache_name(),
        runtime_cache: ctx.config.runtime_cache_name(),
        manifest_entries: ctx.config.precache.len(),
        state: ctx.worker.state().to_string(),
        controller: controller.clone(),
        cache_dir: if opts.no_cache {
            None
        } else {
            Some(ctx.config.cache_dir()?.display().to_string())
        },
    };

    if opts.format == OutputFormat::Json {
        println!("{}", format_site_json(&report, &ctx.config)?);
        return Ok(());
    }

    println!("{}\n", "sitecache status".bold());
    println!("Config file: {}", report.config_path.cyan());
    println!("Origin:      {}", report.origin.bold());
    println!("Version:     {}", report.version.bold());
    println!();
    println!("Precache:      {} ({} entries)", report.precache, report.manifest_entries);
    println!("Runtime cache: {}", report.runtime_cache);
    match &report.cache_dir {
        Some(dir) => println!("Cache dir:     {}", dir),
        None => println!("Cache dir:     {}", "in memory (--no-cache)".dimmed()),
    }
    println!();

    match controller.as_deref() {
        Some(v) if v == ctx.config.version => {
            println!("{} {} controls pages", "✓".green(), v.bold());
        }
        Some(v) => {
            println!(
                "{} {} controls pages; {} is {}",
                "⚠".yellow(),
                v.bold(),
                report.version.bold(),
                report.state
            );
            println!("  → Run 'sitecache update' to hand over control");
        }
        None => {
            println!("{} No version controls pages ({})", "○".dimmed(), report.state);
            println!("  → Run 'sitecache install' and 'sitecache activate'");
        }
    }
    println!();

    Ok(())
}
