//! Web vitals command

use colored::{ColoredString, Colorize};

use crate::cli::{GlobalOptions, OutputFormat};
use crate::error::Result;
use crate::output::json::format_json;
use crate::vitals::{Rating, VitalsEvent, format_value};

/// Rate one sample and print the analytics event it would send
pub fn run(opts: &GlobalOptions, name: &str, value: f64, id: &str) -> Result<()> {
    let event = VitalsEvent::new(name, id, value);

    match opts.format {
        OutputFormat::Json => println!("{}", format_json(&event)?),
        _ => {
            println!(
                "[Web Vitals] {}: {} ({})",
                name.bold(),
                format_value(name, value),
                colorize(event.metric_rating)
            );
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
    }
    Ok(())
}

fn colorize(rating: Rating) -> ColoredString {
    let label = rating.to_string();
    match rating {
        Rating::Good => label.green().bold(),
        Rating::NeedsImprovement => label.yellow().bold(),
        Rating::Poor => label.red().bold(),
    }
}
