//! CLI command definitions and handlers

use clap::{Parser, Subcommand};
pub use clap_complete::Shell;

pub mod args;
pub mod cache;
pub mod context;
pub mod init;
pub mod status;
pub mod vitals;
pub mod worker;

pub use args::{GlobalOptions, OutputFormat};
pub use context::CommandContext;

use crate::net::Destination;

/// sitecache - offline caching layer for a brochure site
#[derive(Parser, Debug)]
#[command(name = "sitecache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "SITECACHE_FORMAT",
        default_value = "pretty",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "SITECACHE_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "SITECACHE_DEBUG", hide_env = true)]
    pub debug: bool,

    /// Keep caches in memory for this run only
    #[arg(long, global = true, env = "SITECACHE_NO_CACHE", hide_env = true)]
    pub no_cache: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a configuration file for a site
    Init {
        /// Site origin, e.g. https://example.com
        #[arg(long)]
        origin: Option<String>,

        /// Deploy version used in cache names
        #[arg(long, value_name = "VERSION")]
        release: Option<String>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show configuration and worker status
    Status,

    /// Precache the manifest for the configured version
    Install,

    /// Activate the installed version and remove stale caches
    Activate {
        /// Take control even if another version controls pages
        #[arg(long)]
        skip_waiting: bool,
    },

    /// Install the configured version and hand control to it
    Update {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Serve a request through the worker
    Fetch {
        /// Absolute URL or a path on the configured origin
        url: String,

        /// Request destination
        #[arg(long, value_enum, default_value = "empty")]
        destination: Destination,

        /// Accept header
        #[arg(long)]
        accept: Option<String>,

        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,
    },

    /// Manage the named caches
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Rate a web vitals sample
    Vitals {
        /// Metric name (LCP, FID, CLS, FCP, TTFB, INP)
        name: String,

        /// Sample value (milliseconds; unitless for CLS)
        value: f64,

        /// Metric instance id used as the analytics label
        #[arg(long, default_value = "cli")]
        id: String,
    },

    /// Generate shell completions
    #[command(after_help = "\
Examples:
  bash:   sitecache completion bash > /etc/bash_completion.d/sitecache
  zsh:    sitecache completion zsh > \"${fpath[1]}/_sitecache\"
  fish:   sitecache completion fish > ~/.config/fish/completions/sitecache.fish")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Cache management subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,

    /// List caches and their sizes
    List {
        /// Also list the URLs stored in each cache
        #[arg(long)]
        entries: bool,
    },

    /// Delete every cache through the worker
    Clear,

    /// Print the cache directory
    Path,
}
