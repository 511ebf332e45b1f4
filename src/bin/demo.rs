//! demo - camera-free run of the energy saver
//!
//! Replaces motion estimation with a random detector so the timeout and
//! reactivation behaviour can be watched in about a minute, then writes a
//! summary with the full event history to `demo_results.json`.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use energy_saver::config::parse_evidence_logging;
use energy_saver::{
    Action, ActuatorSet, CameraConfig, CameraSource, EventRecord, InMemoryEventStore,
    OccupancyController, RandomBackend, RuntimeConfig, SimulatedActuator, Supervisor,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulated occupancy run, no camera required")]
struct Args {
    /// Demo length in seconds.
    #[arg(long, default_value_t = 60)]
    duration: u64,
    /// No-motion timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    /// Seconds between motion checks.
    #[arg(long, default_value_t = 2)]
    interval: u64,
    /// Chance of motion per check.
    #[arg(long, default_value_t = 0.3)]
    probability: f64,
    /// Deterministic detector seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Evidence records while on: every_tick or transitions_only.
    #[arg(long, default_value = "transitions_only", value_name = "MODE")]
    evidence_logging: String,
    /// Results file.
    #[arg(long, default_value = "demo_results.json")]
    output: PathBuf,
    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Serialize)]
struct DemoSummary {
    motion_detections: usize,
    energy_saves: usize,
    total_events: usize,
}

#[derive(Serialize)]
struct DemoResults<'a> {
    demo_summary: DemoSummary,
    events: &'a [EventRecord],
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(
        Some(&args.ui),
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    let duration = Duration::from_secs(args.duration);
    let interval = Duration::from_secs(args.interval.max(1));
    println!("Starting Smart Energy Saver demo");
    println!("Demo duration: {} seconds", args.duration);
    println!("Motion check interval: {} seconds", interval.as_secs());
    println!("No motion timeout: {} seconds", args.timeout);
    println!("{}", "-".repeat(50));

    let supervisor = {
        let _stage = ui.stage("Start simulated room");
        let backend = match args.seed {
            Some(seed) => RandomBackend::seeded(args.probability, seed)?,
            None => RandomBackend::new(args.probability)?,
        };
        let source = CameraSource::new(CameraConfig {
            device: "stub://demo".to_string(),
            target_fps: 1,
            width: 32,
            height: 24,
        })?;
        let controller = OccupancyController::new(Duration::from_secs(args.timeout), Instant::now())
            .with_evidence_logging(parse_evidence_logging(&args.evidence_logging)?);
        Supervisor::start(
            controller,
            ActuatorSet::new().with(Box::new(SimulatedActuator::new())),
            Box::new(InMemoryEventStore::new()),
            Box::new(source),
            Box::new(backend),
            RuntimeConfig {
                detection_interval: interval,
                tick_interval: Duration::from_secs(1),
                stop_grace: Duration::from_secs(2),
            },
        )?
    };

    let handle = supervisor.handle();
    let stop = supervisor.stop_signal();
    let interrupt = stop.clone();
    ctrlc::set_handler(move || interrupt.stop()).context("error setting Ctrl-C handler")?;

    let started = Instant::now();
    let bar = ui.run_bar("Running demo", duration);
    while started.elapsed() < duration {
        let remaining = duration.saturating_sub(started.elapsed());
        if stop.wait_timeout(interval.min(remaining)) {
            bar.println("Demo stopped by user");
            break;
        }
        let status = handle.status()?;
        let lights = status.state.to_string();
        bar.println(&format!(
            "Status: Lights: {lights} | Fans: {lights} | Time since motion: {:.1}s",
            status.idle.as_secs_f64()
        ));
        bar.set_elapsed(started.elapsed());
    }
    bar.finish();

    let report = {
        let _stage = ui.stage("Stop simulated room");
        supervisor.stop()?
    };
    let events = report.records;
    show_summary(&events);

    {
        let _stage = ui.stage("Write demo results");
        let results = DemoResults {
            demo_summary: summarize(&events),
            events: &events,
        };
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(&args.output, json)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
    }
    println!("\nDemo results saved to '{}'", args.output.display());
    Ok(())
}

fn summarize(events: &[EventRecord]) -> DemoSummary {
    DemoSummary {
        motion_detections: events.iter().filter(|e| e.motion_detected).count(),
        energy_saves: events
            .iter()
            .filter(|e| e.action == Some(Action::TurnOff))
            .count(),
        total_events: events.len(),
    }
}

fn show_summary(events: &[EventRecord]) {
    let summary = summarize(events);
    println!("\n{}", "=".repeat(50));
    println!("DEMO SUMMARY");
    println!("{}", "=".repeat(50));
    println!("Total motion detections: {}", summary.motion_detections);
    println!("Total energy save events: {}", summary.energy_saves);
    println!("Total events logged: {}", summary.total_events);

    if events.is_empty() {
        return;
    }
    println!("\nEvent timeline:");
    for event in &events[events.len().saturating_sub(10)..] {
        let kind = if event.motion_detected { "Motion" } else { "Timeout" };
        let action = event
            .action
            .map(|a| format!("appliances turned {}", a))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} - {} - {}",
            event.timestamp.format("%H:%M:%S"),
            kind,
            action
        );
    }
}
