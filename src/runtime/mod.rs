//! Runtime wiring.
//!
//! Three threads cooperate:
//! - `controller` owns all mutable state and applies commands in order
//! - `detection` turns frames into evidence at the detection interval
//! - `ticker` runs the timeout check at the tick interval
//!
//! `Supervisor` starts them and shuts them down in order: workers first,
//! bounded by a grace period, then the controller, which flushes the event
//! history on its way out.

use anyhow::{anyhow, Result};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::actuator::ActuatorSet;
use crate::config::SaverConfig;
use crate::detect::DetectorBackend;
use crate::events::EventStore;
use crate::ingest::FrameSource;
use crate::occupancy::OccupancyController;

mod actor;
mod signal;
mod workers;

pub use actor::{spawn_controller, Command, ControllerHandle, ShutdownReport, Status};
pub use signal::StopSignal;
pub use workers::{spawn_detection, spawn_ticker, DetectionExit};

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    pub detection_interval: Duration,
    pub tick_interval: Duration,
    /// How long `stop` waits for each worker before detaching it.
    pub stop_grace: Duration,
}

impl From<&SaverConfig> for RuntimeConfig {
    fn from(cfg: &SaverConfig) -> Self {
        Self {
            detection_interval: cfg.detection_interval,
            tick_interval: cfg.tick_interval,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

pub struct Supervisor {
    handle: ControllerHandle,
    stop: StopSignal,
    grace: Duration,
    actor: Option<JoinHandle<()>>,
    detection: Option<JoinHandle<DetectionExit>>,
    ticker: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Connect `source` and start the controller, detection and ticker threads.
    pub fn start(
        controller: OccupancyController,
        actuators: ActuatorSet,
        store: Box<dyn EventStore>,
        mut source: Box<dyn FrameSource>,
        backend: Box<dyn DetectorBackend>,
        cfg: RuntimeConfig,
    ) -> Result<Self> {
        source.connect()?;

        let stop = StopSignal::new();
        let (handle, actor) = spawn_controller(controller, actuators, store)?;
        let mut supervisor = Self {
            handle: handle.clone(),
            stop: stop.clone(),
            grace: cfg.stop_grace,
            actor: Some(actor),
            detection: None,
            ticker: None,
        };
        supervisor.detection = Some(spawn_detection(
            source,
            backend,
            handle.clone(),
            cfg.detection_interval,
            stop.clone(),
        )?);
        supervisor.ticker = Some(spawn_ticker(handle, cfg.tick_interval, stop)?);
        Ok(supervisor)
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// False once the detection loop has ended for any reason.
    pub fn detection_running(&self) -> bool {
        self.detection
            .as_ref()
            .map_or(false, |join| !join.is_finished())
    }

    /// Stop the workers, then the controller. Returns the controller's report
    /// together with how detection ended.
    pub fn stop(mut self) -> Result<ShutdownReport> {
        self.stop.stop();
        let detection = self
            .detection
            .take()
            .and_then(|join| join_within(join, self.grace, "detection"));
        if let Some(join) = self.ticker.take() {
            join_within(join, self.grace, "ticker");
        }
        let mut report = self.handle.shutdown()?;
        report.detection = detection;
        if let Some(join) = self.actor.take() {
            join.join()
                .map_err(|_| anyhow!("controller thread panicked"))?;
        }
        Ok(report)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/// Join `join` if it finishes within `grace`, otherwise detach it.
fn join_within<T>(join: JoinHandle<T>, grace: Duration, name: &str) -> Option<T> {
    let deadline = Instant::now() + grace;
    while !join.is_finished() {
        if Instant::now() >= deadline {
            log::warn!("{} thread did not stop within {:?}; detaching", name, grace);
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    match join.join() {
        Ok(value) => Some(value),
        Err(_) => {
            log::error!("{} thread panicked", name);
            None
        }
    }
}
