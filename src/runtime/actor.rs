//! Controller actor.
//!
//! One thread owns the occupancy controller, the actuators and the event
//! store. Every other thread talks to it through a `ControllerHandle`.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::workers::DetectionExit;
use crate::actuator::ActuatorSet;
use crate::events::{export_json, today, DailyStats, EventRecord, EventStore};
use crate::occupancy::{ApplianceState, Decision, OccupancyController};

const STATUS_LOG_EVERY: Duration = Duration::from_secs(10);

/// Snapshot of the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Status {
    pub state: ApplianceState,
    pub idle: Duration,
    pub remaining: Duration,
    pub timeout: Duration,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "appliances {}, idle {}s, {}s to shutdown",
            self.state,
            self.idle.as_secs(),
            self.remaining.as_secs()
        )
    }
}

/// What the actor hands back when it stops.
#[derive(Debug)]
pub struct ShutdownReport {
    pub final_state: ApplianceState,
    pub stats: DailyStats,
    pub records: Vec<EventRecord>,
    /// Set when the final flush of the event store failed.
    pub flush_error: Option<String>,
    /// How the detection loop ended, when it was joined in time.
    pub detection: Option<DetectionExit>,
}

pub enum Command {
    Evidence { detected: bool, at: Instant },
    Tick(Instant),
    ResetTimer(Instant),
    ForceOn(Instant),
    ForceOff,
    Status(Instant, mpsc::Sender<Status>),
    DailyStats(NaiveDate, mpsc::Sender<DailyStats>),
    Records(mpsc::Sender<Vec<EventRecord>>),
    Export(mpsc::Sender<Result<String>>),
    Shutdown(mpsc::Sender<ShutdownReport>),
}

#[derive(Clone, Debug)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Command>,
}

impl ControllerHandle {
    fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .send(cmd)
            .map_err(|_| anyhow!("controller is no longer running"))
    }

    fn request<T>(&self, make: impl FnOnce(mpsc::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = mpsc::channel();
        self.send(make(tx))?;
        rx.recv()
            .map_err(|_| anyhow!("controller stopped before replying"))
    }

    pub fn evidence(&self, detected: bool, at: Instant) -> Result<()> {
        self.send(Command::Evidence { detected, at })
    }

    pub fn tick(&self, at: Instant) -> Result<()> {
        self.send(Command::Tick(at))
    }

    pub fn reset_timer(&self) -> Result<()> {
        self.send(Command::ResetTimer(Instant::now()))
    }

    pub fn force_on(&self) -> Result<()> {
        self.send(Command::ForceOn(Instant::now()))
    }

    pub fn force_off(&self) -> Result<()> {
        self.send(Command::ForceOff)
    }

    pub fn status(&self) -> Result<Status> {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, at: Instant) -> Result<Status> {
        self.request(|tx| Command::Status(at, tx))
    }

    pub fn daily_stats(&self, date: NaiveDate) -> Result<DailyStats> {
        self.request(|tx| Command::DailyStats(date, tx))
    }

    pub fn records(&self) -> Result<Vec<EventRecord>> {
        self.request(Command::Records)
    }

    pub fn export_json(&self) -> Result<String> {
        self.request(Command::Export)?
    }

    /// Flush the store, release the actuators and stop the actor.
    pub fn shutdown(&self) -> Result<ShutdownReport> {
        self.request(Command::Shutdown)
    }
}

struct ControllerActor {
    controller: OccupancyController,
    actuators: ActuatorSet,
    store: Box<dyn EventStore>,
    last_status_log: Option<Instant>,
}

/// Start the actor thread.
pub fn spawn_controller(
    controller: OccupancyController,
    actuators: ActuatorSet,
    store: Box<dyn EventStore>,
) -> Result<(ControllerHandle, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel();
    let actor = ControllerActor {
        controller,
        actuators,
        store,
        last_status_log: None,
    };
    let join = std::thread::Builder::new()
        .name("controller".into())
        .spawn(move || actor.run(rx))?;
    Ok((ControllerHandle { tx }, join))
}

impl ControllerActor {
    fn run(mut self, rx: mpsc::Receiver<Command>) {
        log::info!(
            "controller running: appliances {}, timeout {}s",
            self.controller.state(),
            self.controller.timeout().as_secs()
        );
        for cmd in rx.iter() {
            match cmd {
                Command::Evidence { detected, at } => {
                    if detected {
                        log::info!("motion detected");
                    } else {
                        log::info!("no motion");
                    }
                    let decision = self.controller.on_evidence(detected, at);
                    self.carry_out(decision);
                }
                Command::Tick(at) => {
                    let decision = self.controller.tick(at);
                    self.carry_out(decision);
                    self.log_status(at);
                }
                Command::ResetTimer(at) => {
                    self.controller.reset_timer(at);
                    log::info!("motion timer reset");
                }
                Command::ForceOn(at) => {
                    let decision = self.controller.turn_on(at);
                    self.carry_out(decision);
                }
                Command::ForceOff => {
                    let decision = self.controller.turn_off();
                    self.carry_out(decision);
                }
                Command::Status(at, reply) => {
                    let _ = reply.send(self.status(at));
                }
                Command::DailyStats(date, reply) => {
                    let _ = reply.send(self.store.daily_stats(date));
                }
                Command::Records(reply) => {
                    let _ = reply.send(self.store.records().to_vec());
                }
                Command::Export(reply) => {
                    let _ = reply.send(export_json(self.store.records()));
                }
                Command::Shutdown(reply) => {
                    let report = self.finish();
                    let _ = reply.send(report);
                    return;
                }
            }
        }
        // Every handle dropped without an explicit shutdown.
        self.finish();
    }

    fn carry_out(&mut self, decision: Decision) {
        if let Some(action) = decision.action {
            log::info!("switching lights and fans {}", action);
            let failures = self.actuators.apply(action);
            if failures > 0 {
                log::warn!("{} actuator(s) failed to switch {}", failures, action);
            }
        }
        if let Some(entry) = decision.log {
            if let Err(e) = self.store.append(EventRecord::now(entry)) {
                log::warn!("failed to record event: {:#}", e);
            }
        }
    }

    fn status(&self, at: Instant) -> Status {
        Status {
            state: self.controller.state(),
            idle: self.controller.idle(at),
            remaining: self.controller.remaining(at),
            timeout: self.controller.timeout(),
        }
    }

    fn log_status(&mut self, at: Instant) {
        let status = self.status(at);
        log::debug!("{}", status);
        let due = self
            .last_status_log
            .map_or(true, |last| at.saturating_duration_since(last) >= STATUS_LOG_EVERY);
        if due {
            log::info!("{}", status);
            self.last_status_log = Some(at);
        }
    }

    fn finish(&mut self) -> ShutdownReport {
        let flush_error = match self.store.flush() {
            Ok(()) => None,
            Err(e) => {
                log::error!("failed to save events: {:#}", e);
                Some(format!("{:#}", e))
            }
        };
        self.actuators.shutdown();
        let stats = self.store.daily_stats(today());
        log::info!("controller stopped. final daily statistics: {}", stats);
        ShutdownReport {
            final_state: self.controller.state(),
            stats,
            records: self.store.records().to_vec(),
            flush_error,
            detection: None,
        }
    }
}
