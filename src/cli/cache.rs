//! Cache management commands

use colored::Colorize;
use serde::Serialize;
use tabled::settings::object::Rows;
use tabled::settings::{Alignment, Modify, Style};
use tabled::{Table, Tabled};

use crate::cache::SqliteCacheStore;
use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::formatters::{format_size, format_timestamp};
use crate::output::json::format_site_json;
use crate::worker::{ServiceWorkerContainer, WorkerState, spawn_worker};

/// Show cache status/statistics
pub fn status(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let store = require_persistent(&ctx)?;
    let stats = store.storage()?.stats()?;
    let path = ctx.config.cache_dir()?.display().to_string();

    match opts.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "total_caches": stats.total_caches,
                "total_entries": stats.total_entries,
                "total_size_bytes": stats.total_size_bytes,
                "total_size_human": format_size(stats.total_size_bytes),
                "oldest_entry_timestamp": stats.oldest_entry,
                "newest_entry_timestamp": stats.newest_entry,
                "path": path,
            });
            println!("{}", format_site_json(&json, &ctx.config)?);
        }
        _ => {
            println!("Cache Status");
            println!("────────────────────────────────────────");
            println!("Location:       {}", path);
            println!("Caches:         {}", stats.total_caches);
            println!("Entries:        {}", stats.total_entries);
            println!("Total size:     {}", format_size(stats.total_size_bytes));

            if let Some(oldest) = stats.oldest_entry {
                println!("Oldest entry:   {}", format_timestamp(oldest));
            }
            if let Some(newest) = stats.newest_entry {
                println!("Newest entry:   {}", format_timestamp(newest));
            }
        }
    }

    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct CacheRow {
    #[tabled(rename = "CACHE")]
    name: String,
    #[tabled(rename = "ENTRIES")]
    entries: usize,
    #[tabled(rename = "SIZE")]
    size: String,
    #[tabled(rename = "CREATED")]
    created: String,
    #[tabled(rename = "CURRENT")]
    current: String,
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    urls: Option<Vec<String>>,
}

/// Shown by `cache list` when storage holds no caches
pub const NO_CACHES: &str = "No caches found. Run 'sitecache install' to precache the site.";

/// Rounded table with centered headers; stale caches sort after current ones
fn render_caches(rows: &[CacheRow]) -> String {
    if rows.is_empty() {
        return NO_CACHES.to_string();
    }

    let mut ordered: Vec<&CacheRow> = rows.iter().collect();
    ordered.sort_by_key(|row| row.current != "yes");

    let mut table = Table::new(ordered);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}

/// List caches with entry counts
pub fn list(opts: &GlobalOptions, with_entries: bool) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let store = require_persistent(&ctx)?;
    let allow_list = ctx.worker.config().allow_list();

    let rows = {
        let storage = store.storage()?;
        storage
            .summaries()?
            .into_iter()
            .map(|summary| {
                let urls = if with_entries {
                    Some(storage.entry_urls(&summary.name)?)
                } else {
                    None
                };
                Ok(CacheRow {
                    current: if allow_list.contains(&summary.name) {
                        "yes".to_string()
                    } else {
                        "stale".to_string()
                    },
                    entries: summary.entries,
                    size: format_size(summary.size_bytes),
                    created: format_timestamp(summary.created_at),
                    name: summary.name,
                    urls,
                })
            })
            .collect::<Result<Vec<_>>>()?
    };

    match opts.format {
        OutputFormat::Json => println!("{}", format_site_json(&rows, &ctx.config)?),
        _ => {
            println!("{}", render_caches(&rows));
            for row in rows.iter().filter(|r| r.urls.is_some()) {
                println!("\n{}", row.name.bold());
                for url in row.urls.iter().flatten() {
                    println!("  {}", url);
                }
            }
        }
    }
    Ok(())
}

/// Delete every cache by messaging the worker
pub async fn clear(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let before = match ctx.persistent_store() {
        Some(store) => store.storage()?.stats()?.total_entries,
        None => 0,
    };

    // Only an activated worker is reachable from pages
    let mut container = ServiceWorkerContainer::new(ctx.config.clear_timeout());
    if ctx.worker.state() == WorkerState::Activated {
        let (handle, _task) = spawn_worker(ctx.worker.clone());
        container = container.with_active(handle);
    }
    let cleared = container.clear_cache().await;

    match opts.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "cleared": cleared,
                "entries_removed": if cleared { before } else { 0 },
            });
            println!("{}", format_site_json(&json, &ctx.config)?);
        }
        _ => {
            if !cleared {
                println!(
                    "{} Caches were not cleared ({} is {})",
                    "✗".red(),
                    ctx.config.version,
                    ctx.worker.state()
                );
            } else if before > 0 {
                println!("Cleared {} cache entries", before);
            } else {
                println!("Cache was already empty");
            }
        }
    }

    if cleared {
        Ok(())
    } else {
        Err(Error::Other("clearCache was not acknowledged".to_string()))
    }
}

/// Show cache path
pub fn path(opts: &GlobalOptions) -> Result<()> {
    let config = Config::load_at(opts.config_ref())?;
    println!("{}", config.cache_dir()?.display());
    Ok(())
}

fn require_persistent(ctx: &CommandContext) -> Result<&SqliteCacheStore> {
    ctx.persistent_store()
        .ok_or_else(|| Error::Other("no persistent cache with --no-cache".to_string()))
}
