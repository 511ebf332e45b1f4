//! Smart Energy Saver
//!
//! Watches a room through a camera and switches lights and fans off once no
//! one has been seen for a configurable timeout, and back on as soon as
//! someone is.
//!
//! # Architecture
//!
//! Two decoupled stages meet at a single boolean:
//!
//! 1. **Motion estimation**: each frame is compared against an adaptive
//!    per-pixel Gaussian-mixture background. Foreground is cleaned with an
//!    elliptical opening and closing, and only external regions above a
//!    minimum area count as evidence of presence.
//! 2. **Occupancy control**: a two-state machine turns evidence and elapsed
//!    time into ON/OFF actions and event records.
//!
//! Frames never leave the detection worker; the controller only sees
//! evidence bits and timestamps.
//!
//! # Module Structure
//!
//! - `frame`: RGB frames
//! - `ingest`: frame sources (camera, synthetic scene, image sequences)
//! - `detect`: background model, morphology, regions, estimator, mock backend
//! - `occupancy`: the ON/OFF state machine
//! - `actuator`: simulated, GPIO and MQTT outputs
//! - `events`: event history, daily statistics, JSON export
//! - `runtime`: controller actor, workers, supervisor
//! - `config`: file and environment configuration

pub mod actuator;
pub mod config;
pub mod detect;
pub mod events;
pub mod frame;
pub mod ingest;
pub mod occupancy;
pub mod runtime;

pub use actuator::{ActuatorSet, ActuatorSink, GpioRelay, MqttPublisher, SimulatedActuator};
pub use config::SaverConfig;
pub use detect::{
    DetectorBackend, DimensionMismatch, EstimatorConfig, MotionEstimator, Observation,
    RandomBackend, Region,
};
pub use events::{
    daily_stats, export_json, DailyStats, EventRecord, EventStore, InMemoryEventStore,
    JsonFileEventStore,
};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, FrameSource, ImageSequenceSource};
pub use occupancy::{
    Action, ApplianceState, Decision, EvidenceLogging, LogEntry, OccupancyController,
};
pub use runtime::{
    ControllerHandle, DetectionExit, RuntimeConfig, ShutdownReport, Status, StopSignal, Supervisor,
};
