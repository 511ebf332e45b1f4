//! energy_saver - occupancy-driven lights and fans controller
//!
//! This daemon:
//! 1. Captures frames from the configured camera (or an image sequence)
//! 2. Estimates motion against an adaptive background model
//! 3. Switches lights and fans off after the no-motion timeout, on at motion
//! 4. Records transitions to the event history and reports daily statistics
//!
//! Interactive commands on stdin: `s` stats, `r` reset timer, `on`/`off`
//! force a state, `status`, `q` quit.
//!
//! The daemon also stops once detection ends, and exits with an error when
//! the camera or the detector failed.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use energy_saver::config::{camera_device_path, parse_evidence_logging};
use energy_saver::events::today;
use energy_saver::{
    ActuatorSet, CameraConfig, CameraSource, ControllerHandle, FrameSource, ImageSequenceSource,
    JsonFileEventStore, MotionEstimator, OccupancyController, RuntimeConfig, SaverConfig,
    Supervisor,
};

#[allow(dead_code)]
#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Switch lights and fans off when the room is empty")]
struct Args {
    /// Camera index, opens /dev/videoN.
    #[arg(long)]
    camera: Option<u32>,
    /// Camera device path, or stub://name for the synthetic scene.
    #[arg(long, value_name = "PATH")]
    device: Option<String>,
    /// Replay PNG/JPEG frames from a directory instead of a camera.
    #[arg(long, value_name = "DIR", conflicts_with_all = ["camera", "device"])]
    frames_dir: Option<PathBuf>,
    /// No-motion timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Background variance gate; larger values need bigger changes.
    #[arg(long)]
    sensitivity: Option<f32>,
    /// Minimum region area in pixels.
    #[arg(long)]
    min_area: Option<u32>,
    /// Event history file.
    #[arg(long, value_name = "PATH")]
    events: Option<PathBuf>,
    /// Evidence records while on: every_tick or transitions_only.
    #[arg(long, value_name = "MODE")]
    evidence_logging: Option<String>,
    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<u64>,
    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

enum HostEvent {
    Interrupt,
    Line(String),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(
        Some(&args.ui),
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    let cfg = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = SaverConfig::load()?;
        apply_args(&mut cfg, &args)?;
        cfg.validate()?;
        cfg
    };

    let source: Box<dyn FrameSource> = match &args.frames_dir {
        Some(dir) => Box::new(ImageSequenceSource::new(dir)),
        None => Box::new(CameraSource::new(CameraConfig::from(&cfg.camera))?),
    };
    let actuators = {
        let _stage = ui.stage("Prepare actuators");
        ActuatorSet::from_config(&cfg)?
    };
    log::info!("switching through: {}", actuators.names().join(", "));
    let store = JsonFileEventStore::open(&cfg.events_path)?;
    let controller = OccupancyController::new(cfg.no_motion_timeout, Instant::now())
        .with_evidence_logging(cfg.evidence_logging);

    let supervisor = {
        let _stage = ui.stage("Start detection");
        Supervisor::start(
            controller,
            actuators,
            Box::new(store),
            source,
            Box::new(MotionEstimator::new(cfg.detection.clone())),
            RuntimeConfig::from(&cfg),
        )?
    };
    log::info!(
        "energy_saver running. no-motion timeout {}s, events in {}",
        cfg.no_motion_timeout.as_secs(),
        cfg.events_path.display()
    );

    let (tx, rx) = mpsc::channel();
    let interrupt_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(HostEvent::Interrupt);
    })
    .context("error setting Ctrl-C handler")?;
    spawn_stdin_reader(tx)?;
    println!("Commands: s = daily stats, r = reset motion timer, on/off, status, q = quit");

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let handle = supervisor.handle();
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("run duration reached");
            break;
        }
        if !supervisor.detection_running() {
            log::warn!("detection has stopped; shutting down");
            break;
        }
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(HostEvent::Interrupt) => {
                log::info!("shutdown signal received");
                break;
            }
            Ok(HostEvent::Line(line)) => {
                if !run_command(line.trim(), &handle)? {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    let report = {
        let _stage = ui.stage("Stop and save events");
        supervisor.stop()?
    };
    println!("Final daily statistics: {}", report.stats);
    if let Some(err) = report.flush_error {
        return Err(anyhow!("event history was not saved: {}", err));
    }
    match report.detection {
        Some(exit) if exit.is_failure() => Err(anyhow!("detection failed: {:?}", exit)),
        _ => Ok(()),
    }
}

fn apply_args(cfg: &mut SaverConfig, args: &Args) -> Result<()> {
    if let Some(index) = args.camera {
        cfg.camera.index = index;
        cfg.camera.device = camera_device_path(index);
    }
    if let Some(device) = &args.device {
        cfg.camera.device = device.clone();
    }
    if let Some(timeout) = args.timeout {
        cfg.no_motion_timeout = Duration::from_secs(timeout);
    }
    if let Some(sensitivity) = args.sensitivity {
        cfg.detection.sensitivity = sensitivity;
    }
    if let Some(min_area) = args.min_area {
        cfg.detection.min_region_area = min_area;
    }
    if let Some(path) = &args.events {
        cfg.events_path = path.clone();
    }
    if let Some(mode) = &args.evidence_logging {
        cfg.evidence_logging = parse_evidence_logging(mode)?;
    }
    Ok(())
}

/// Returns `false` when the operator asked to quit.
fn run_command(command: &str, handle: &ControllerHandle) -> Result<bool> {
    match command {
        "" => {}
        "q" | "quit" => return Ok(false),
        "s" | "stats" => println!("Daily stats: {}", handle.daily_stats(today())?),
        "r" | "reset" => {
            handle.reset_timer()?;
            println!("Motion timer reset");
        }
        "on" => handle.force_on()?,
        "off" => handle.force_off()?,
        "status" => println!("{}", handle.status()?),
        other => println!("Unknown command {:?}", other),
    }
    Ok(true)
}

fn spawn_stdin_reader(tx: mpsc::Sender<HostEvent>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(HostEvent::Line(line)).is_err() {
                    break;
                }
            }
            // EOF leaves the daemon running; Ctrl-C or --duration still stop it.
        })?;
    Ok(())
}
