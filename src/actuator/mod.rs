//! Appliance actuation.
//!
//! Sinks are fire-and-forget: the controller has already committed to the
//! new state when a sink is called, and a failing sink never changes it.

use anyhow::Result;

use crate::config::SaverConfig;
use crate::occupancy::Action;

pub mod gpio;
pub mod mqtt;
mod simulated;

pub use gpio::GpioRelay;
pub use mqtt::MqttPublisher;
pub use simulated::SimulatedActuator;

/// Output that switches lights and fans together.
pub trait ActuatorSink: Send {
    fn name(&self) -> &str;
    fn turn_on(&mut self) -> Result<()>;
    fn turn_off(&mut self) -> Result<()>;

    /// Release the underlying resource.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    fn apply(&mut self, action: Action) -> Result<()> {
        match action {
            Action::TurnOn => self.turn_on(),
            Action::TurnOff => self.turn_off(),
        }
    }
}

/// Every configured sink, driven together.
#[derive(Default)]
pub struct ActuatorSet {
    sinks: Vec<Box<dyn ActuatorSink>>,
}

impl ActuatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Box<dyn ActuatorSink>) -> Self {
        self.push(sink);
        self
    }

    /// Simulated sink always, plus GPIO and MQTT when configured.
    pub fn from_config(cfg: &SaverConfig) -> Result<Self> {
        let mut set = Self::new().with(Box::new(SimulatedActuator::new()));
        if cfg.gpio.enabled {
            set.push(Box::new(GpioRelay::open(&cfg.gpio)?));
        }
        if cfg.mqtt.broker.is_some() {
            set.push(Box::new(MqttPublisher::connect(&cfg.mqtt)?));
        }
        Ok(set)
    }

    pub fn push(&mut self, sink: Box<dyn ActuatorSink>) {
        log::info!("actuator sink enabled: {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Drive every sink, continuing past failures. Returns the failure count.
    pub fn apply(&mut self, action: Action) -> usize {
        let mut failures = 0;
        for sink in &mut self.sinks {
            if let Err(e) = sink.apply(action) {
                failures += 1;
                log::warn!("actuator {} failed to switch {}: {:#}", sink.name(), action, e);
            }
        }
        failures
    }

    pub fn shutdown(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.shutdown() {
                log::warn!("actuator {} shutdown failed: {:#}", sink.name(), e);
            }
        }
    }
}
