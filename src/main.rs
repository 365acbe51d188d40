mod range;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ical_expander_core::{ExpanderOptions, IcalExpander, register_timezones};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ical-expand")]
#[command(about = "Expand the events of an .ics file into the instances inside a date window")]
#[command(version)]
struct Cli {
    /// Calendar file (.ics)
    file: PathBuf,

    /// Include instances ending at or after this time (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    after: Option<String>,

    /// Include instances starting at or before this time (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    before: Option<String>,

    /// Options file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Occurrences evaluated per recurring event, 0 for no limit
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Drop events with unreadable dates instead of failing
    #[arg(long)]
    skip_invalid_dates: bool,

    /// Print every property of each instance
    #[arg(long)]
    convert_output: bool,

    /// Resolve TZIDs against the embedded timezone database
    #[arg(long)]
    register_timezones: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("ical_expander_cli={0},ical_expander_core={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = resolve_options(&cli)?;
    let window = range::parse_window(cli.after.as_deref(), cli.before.as_deref())
        .map_err(|e| anyhow::anyhow!(e))?;

    if cli.register_timezones {
        let count = register_timezones();
        tracing::debug!(count, "Registered embedded timezones");
    }

    let ics = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let expander = IcalExpander::new(&ics, options)
        .with_context(|| format!("Failed to load {}", cli.file.display()))?;

    let output = expander.between(window.after, window.before);
    println!("{}", render::to_json(&output)?);

    Ok(())
}

/// Options from `--config`, with explicit flags taking precedence.
fn resolve_options(cli: &Cli) -> Result<ExpanderOptions> {
    let mut options = match &cli.config {
        Some(path) => ExpanderOptions::load(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => ExpanderOptions::default(),
    };

    if let Some(max_iterations) = cli.max_iterations {
        options = options.with_max_iterations(max_iterations);
    }
    if cli.skip_invalid_dates {
        options = options.with_skip_invalid_dates(true);
    }
    if cli.convert_output {
        options = options.with_convert_output(true);
    }

    Ok(options)
}
