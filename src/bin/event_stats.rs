//! event_stats - daily statistics from an event history file

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use energy_saver::events::{load_records, today, DEFAULT_EVENTS_PATH};
use energy_saver::{daily_stats, export_json};

#[allow(dead_code)]
#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Summarize or re-export an event history")]
struct Args {
    /// Event history file.
    #[arg(long, env = "SAVER_EVENTS_PATH", default_value = DEFAULT_EVENTS_PATH)]
    events: PathBuf,
    /// Day to summarize (YYYY-MM-DD), today by default.
    #[arg(long)]
    date: Option<String>,
    /// Print the normalised history as JSON instead of statistics.
    #[arg(long)]
    export: bool,
    /// Write the export to a file instead of stdout.
    #[arg(long, value_name = "PATH", requires = "export")]
    out: Option<PathBuf>,
    /// Print statistics as JSON.
    #[arg(long)]
    json: bool,
    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(
        Some(&args.ui),
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    let records = {
        let _stage = ui.stage("Load event history");
        load_records(&args.events)?
    };

    if args.export {
        let json = export_json(&records)?;
        match &args.out {
            Some(path) => {
                std::fs::write(path, json)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                log::info!("exported {} events to {}", records.len(), path.display());
            }
            None => println!("{json}"),
        }
        return Ok(());
    }

    let date = match &args.date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| anyhow!("invalid --date {:?}: {}", raw, e))?,
        None => today(),
    };
    let stats = daily_stats(&records, date);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Daily stats: {}", stats);
    }
    Ok(())
}
