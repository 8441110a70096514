//! Worker lifecycle and fetch commands

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Method, Url};
use serde::Serialize;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::error::{ConfigError, Error, Result};
use crate::net::{Destination, Fetcher, Request, Response};
use crate::output::formatters::format_size;
use crate::output::json::format_site_json;
use crate::worker::{
    ActivateReport, FetchOutcome, PassthroughReason, ServiceWorkerContainer, WorkerState,
};

/// Precache the manifest for the configured version.
///
/// The new version takes control at once unless another version controls
/// pages.
pub async fn install(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;

    if ctx.worker.state() != WorkerState::Uninstalled {
        return already(&ctx, "installed");
    }

    let spinner = spinner(
        opts.format,
        format!(
            "Precaching {} resources from {}",
            ctx.config.precache.len(),
            ctx.config.origin
        ),
    );
    let result = ctx.worker.install().await;
    spinner.finish_and_clear();

    let report = result?;
    ctx.set_installed()?;
    if report.activation.is_some() {
        ctx.set_controller()?;
    }

    match opts.format {
        OutputFormat::Json => println!("{}", format_site_json(&report, &ctx.config)?),
        _ => {
            println!(
                "{} Installed {} ({} entries in {})",
                "✓".green(),
                ctx.config.version.bold(),
                report.precached,
                report.cache_name
            );
            match &report.activation {
                Some(activation) => print_activation(&ctx, activation)?,
                None => {
                    let controller = ctx.controller()?.unwrap_or_default();
                    println!(
                        "  → Waiting for {}; run 'sitecache update' to take control",
                        controller
                    );
                }
            }
        }
    }
    Ok(())
}

/// Activate the installed version
pub async fn activate(opts: &GlobalOptions, skip_waiting: bool) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    if skip_waiting {
        ctx.worker.skip_waiting();
    }

    let has_controller = ctx.has_other_controller()?;
    let report = match ctx.worker.state() {
        WorkerState::Installed => match ctx.worker.activate_if_ready(has_controller).await? {
            Some(report) => report,
            None => {
                let controller = ctx.controller()?.unwrap_or_default();
                return Err(Error::Other(format!(
                    "{} is waiting for {} to release control (use --skip-waiting)",
                    ctx.config.version, controller
                )));
            }
        },
        // Re-running activation only garbage-collects again
        WorkerState::Activated => ctx.worker.activate().await?,
        state => {
            return Err(Error::Other(format!(
                "{} is {}; run 'sitecache install' first",
                ctx.config.version, state
            )));
        }
    };

    ctx.set_controller()?;
    print_activation(&ctx, &report)
}

/// Install the configured version and hand control to it
pub async fn update(opts: &GlobalOptions, yes: bool) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    if ctx.worker.state() == WorkerState::Activated {
        return already(&ctx, "active");
    }

    let container = ServiceWorkerContainer::new(ctx.config.clear_timeout())
        .with_registration(ctx.worker.clone())
        .on_reload(|| println!("{} Controller changed; reload open pages", "↻".cyan()));

    let spinner = spinner(opts.format, format!("Checking {}", ctx.config.version));
    let updated = container.update().await;
    spinner.finish_and_clear();

    if !updated {
        return Err(Error::Other(format!(
            "Update check for {} failed",
            ctx.config.version
        )));
    }
    ctx.set_installed()?;

    let has_controller = ctx.worker.has_other_controller();
    if ctx.worker.is_waiting(has_controller) {
        let controller = ctx.controller()?.unwrap_or_default();
        let confirmed = yes
            || Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!(
                    "{} controls pages. Switch to {} now?",
                    controller, ctx.config.version
                ))
                .default(true)
                .interact()?;

        if !confirmed {
            println!("{} is installed and waiting", ctx.config.version.bold());
            return Ok(());
        }
        ctx.worker.skip_waiting();
    }

    // The install may already have activated a version nobody controlled
    let report = match ctx.worker.last_activation() {
        Some(report) => report,
        None => ctx
            .worker
            .activate_if_ready(has_controller)
            .await?
            .ok_or_else(|| Error::Other(format!("{} did not activate", ctx.config.version)))?,
    };

    ctx.set_controller()?;
    print_activation(&ctx, &report)?;
    if opts.format != OutputFormat::Json {
        container.controller_changed();
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct FetchReport {
    url: String,
    route: String,
    cache: Option<String>,
    status: u16,
    offline_fallback: bool,
    size_bytes: usize,
    /// Base64 body, JSON output only
    body: String,
}

/// Serve one request through the worker
pub async fn fetch(
    opts: &GlobalOptions,
    url: &str,
    destination: Destination,
    accept: Option<String>,
    method: &str,
) -> Result<()> {
    let ctx = CommandContext::new(opts)?;

    let url = resolve_url(&ctx.config.origin_url()?, url)?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|e| Error::Other(format!("invalid method {}: {}", method, e)))?;

    let mut request = Request::get(url)
        .with_method(method)
        .with_destination(destination);
    if let Some(accept) = accept {
        request = request.with_header("accept", accept);
    }

    let (route, cache, response) = match ctx.worker.handle_fetch(&request).await {
        FetchOutcome::Responded {
            strategy,
            cache_name,
            response,
        } => (strategy.to_string(), Some(cache_name), response),
        FetchOutcome::Passthrough(reason) => {
            let response = ctx.fetcher.fetch(&request).await?;
            (passthrough_label(reason).to_string(), None, response)
        }
    };

    // Let background refreshes land before the process exits
    ctx.worker.settle().await;

    let report = FetchReport {
        url: request.url.to_string(),
        route,
        cache,
        status: response.status,
        offline_fallback: response.is_offline_fallback(),
        size_bytes: response.body.len(),
        body: BASE64.encode(&response.body),
    };

    match opts.format {
        OutputFormat::Json => println!("{}", format_site_json(&report, &ctx.config)?),
        _ => print_fetch(&report, &response),
    }
    Ok(())
}

fn print_fetch(report: &FetchReport, response: &Response) {
    let status = if response.is_ok() {
        response.status.to_string().green()
    } else {
        response.status.to_string().red()
    };

    println!("{} {}", status, report.url);
    match &report.cache {
        Some(cache) => println!("  Route:  {} ({})", report.route.bold(), cache),
        None => println!("  Route:  {}", report.route.dimmed()),
    }
    println!("  Size:   {}", format_size(report.size_bytes));
    if report.offline_fallback {
        println!("  {} offline fallback", "⚠".yellow());
    }
}

fn passthrough_label(reason: PassthroughReason) -> &'static str {
    match reason {
        PassthroughReason::NonGet => "passthrough (non-GET)",
        PassthroughReason::CrossOrigin => "passthrough (cross-origin)",
        PassthroughReason::NotControlling => "passthrough (not activated)",
    }
}

/// Absolute URLs are taken as-is; anything else is a path on the origin
fn resolve_url(origin: &Url, input: &str) -> Result<Url> {
    match Url::parse(input) {
        Ok(url) => Ok(url),
        Err(_) => origin
            .join(input)
            .map_err(|e| ConfigError::Invalid(format!("bad URL {}: {}", input, e)).into()),
    }
}

fn print_activation(ctx: &CommandContext, report: &ActivateReport) -> Result<()> {
    if ctx.format == OutputFormat::Json {
        println!("{}", format_site_json(report, &ctx.config)?);
        return Ok(());
    }

    println!(
        "{} {} is active",
        "✓".green(),
        ctx.config.version.bold()
    );
    if report.deleted.is_empty() {
        println!("  No stale caches");
    } else {
        for name in &report.deleted {
            println!("  Deleted old cache: {}", name.dimmed());
        }
    }
    Ok(())
}

fn already(ctx: &CommandContext, what: &str) -> Result<()> {
    if ctx.format == OutputFormat::Json {
        let json = serde_json::json!({
            "version": ctx.config.version,
            "state": ctx.worker.state(),
        });
        println!("{}", format_site_json(&json, &ctx.config)?);
    } else {
        println!(
            "{} {} is already {}",
            "○".dimmed(),
            ctx.config.version.bold(),
            what
        );
    }
    Ok(())
}

fn spinner(format: OutputFormat, message: String) -> ProgressBar {
    if format == OutputFormat::Json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let origin = Url::parse("https://studio.example").unwrap();
        assert_eq!(
            resolve_url(&origin, "/images/logo.png").unwrap().as_str(),
            "https://studio.example/images/logo.png"
        );
        assert_eq!(
            resolve_url(&origin, "https://fonts.gstatic.com/a.woff2")
                .unwrap()
                .as_str(),
            "https://fonts.gstatic.com/a.woff2"
        );
    }
}
