//! sitecache CLI - offline caching layer for a brochure site

use clap::{CommandFactory, Parser};

use sitecache::cli::{self, CacheCommands, Cli, Commands, GlobalOptions};
use sitecache::error::Result;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Init {
            origin,
            release,
            force,
        } => cli::init::run(&opts, origin, release, force),
        Commands::Status => cli::status::run(&opts),
        Commands::Install => cli::worker::install(&opts).await,
        Commands::Activate { skip_waiting } => cli::worker::activate(&opts, skip_waiting).await,
        Commands::Update { yes } => cli::worker::update(&opts, yes).await,
        Commands::Fetch {
            url,
            destination,
            accept,
            method,
        } => cli::worker::fetch(&opts, &url, destination, accept, &method).await,
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(&opts),
            CacheCommands::List { entries } => cli::cache::list(&opts, entries),
            CacheCommands::Clear => cli::cache::clear(&opts).await,
            CacheCommands::Path => cli::cache::path(&opts),
        },
        Commands::Vitals { name, value, id } => cli::vitals::run(&opts, &name, value, &id),
        Commands::Completion { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "sitecache",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

/// `--debug` forces debug output; otherwise RUST_LOG decides, defaulting to warn
fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp(None).init();
}
