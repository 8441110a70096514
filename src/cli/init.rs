//! Init command implementation

use colored::Colorize;
use dialoguer::{Input, theme::ColorfulTheme};

use crate::cli::GlobalOptions;
use crate::config::Config;
use crate::error::{ConfigError, Result};

/// Run the init command
///
/// Prompts for the origin when `--origin` is not given.
pub fn run(
    opts: &GlobalOptions,
    origin: Option<String>,
    release: Option<String>,
    force: bool,
) -> Result<()> {
    let config_path = Config::resolve_path(opts.config_ref())?;
    if config_path.exists() && !force {
        return Err(ConfigError::Invalid(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        ))
        .into());
    }

    let origin = match origin {
        Some(origin) => origin,
        None => {
            println!("{}", "Welcome to sitecache!".bold().green());
            println!("Let's set up your site.\n");
            Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Site origin (e.g. https://example.com)")
                .interact_text()?
        }
    };

    let mut config = Config::new(origin);
    if let Some(release) = release {
        config.version = release;
    }
    config.validate()?;
    config.save_to(&config_path)?;

    println!(
        "{} Configuration saved to: {}",
        "✓".green(),
        config_path.display()
    );
    println!("  Origin:   {}", config.origin.bold());
    println!("  Precache: {}", config.precache_name().bold());

    println!("\n{}", "Next steps:".bold());
    println!("  {} - Precache the site", "sitecache install".cyan());
    println!("  {} - Take control of pages", "sitecache activate".cyan());

    Ok(())
}
