use anyhow::Result;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::actor::ControllerHandle;
use super::signal::StopSignal;
use crate::detect::{DetectorBackend, DimensionMismatch};
use crate::ingest::FrameSource;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Why the detection loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionExit {
    Stopped,
    SourceExhausted,
    SourceFailed,
    DetectorFailed,
    ControllerGone,
}

impl DetectionExit {
    /// The source or the detector broke, as opposed to a normal end.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::SourceFailed | Self::DetectorFailed)
    }
}

/// Acquire one frame per `interval`, observe it and forward only the
/// evidence bit to the controller.
pub fn spawn_detection(
    mut source: Box<dyn FrameSource>,
    mut backend: Box<dyn DetectorBackend>,
    handle: ControllerHandle,
    interval: Duration,
    stop: StopSignal,
) -> Result<JoinHandle<DetectionExit>> {
    let join = std::thread::Builder::new()
        .name("detection".into())
        .spawn(move || {
            let exit = run_detection(source.as_mut(), backend.as_mut(), &handle, interval, &stop);
            log::info!("detection loop ended: {:?}", exit);
            exit
        })?;
    Ok(join)
}

fn run_detection(
    source: &mut dyn FrameSource,
    backend: &mut dyn DetectorBackend,
    handle: &ControllerHandle,
    interval: Duration,
    stop: &StopSignal,
) -> DetectionExit {
    log::info!(
        "detection running on {} with {} backend every {:?}",
        source.describe(),
        backend.name(),
        interval
    );
    let mut last_health_log = Instant::now();
    let mut healthy = true;
    loop {
        if stop.is_stopped() {
            return DetectionExit::Stopped;
        }

        let now_healthy = source.is_healthy();
        if now_healthy != healthy {
            if now_healthy {
                log::info!("frame source {} recovered", source.describe());
            } else {
                log::warn!("frame source {} is unhealthy", source.describe());
            }
            healthy = now_healthy;
        }
        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log::debug!("frame source {} health={}", source.describe(), healthy);
            last_health_log = Instant::now();
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("frame source {} exhausted", source.describe());
                return DetectionExit::SourceExhausted;
            }
            Err(e) => {
                log::error!("frame acquisition from {} failed: {:#}", source.describe(), e);
                return DetectionExit::SourceFailed;
            }
        };

        let observation = match backend.observe(&frame) {
            Ok(observation) => observation,
            Err(e) => {
                if let Some(mismatch) = e.downcast_ref::<DimensionMismatch>() {
                    log::error!("stopping detection: {}", mismatch);
                } else {
                    log::error!("{} backend failed: {:#}", backend.name(), e);
                }
                return DetectionExit::DetectorFailed;
            }
        };
        if observation.evidence_detected {
            log::debug!(
                "{} region(s), largest {:.0} px",
                observation.regions.len(),
                observation.largest_area()
            );
        }

        if handle
            .evidence(observation.evidence_detected, frame.captured_at())
            .is_err()
        {
            return DetectionExit::ControllerGone;
        }

        if stop.wait_timeout(interval) {
            return DetectionExit::Stopped;
        }
    }
}

/// Drive the controller's timeout check independently of frame arrival.
pub fn spawn_ticker(
    handle: ControllerHandle,
    interval: Duration,
    stop: StopSignal,
) -> Result<JoinHandle<()>> {
    let join = std::thread::Builder::new()
        .name("ticker".into())
        .spawn(move || {
            while !stop.wait_timeout(interval) {
                if handle.tick(Instant::now()).is_err() {
                    break;
                }
            }
        })?;
    Ok(join)
}
