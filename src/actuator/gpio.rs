//! Relay board on sysfs GPIO lines.
//!
//! Each load sits behind one active-high output line:
//! `<root>/gpio<N>/value` holds `1` for on and `0` for off. Shutdown hands
//! both lines back to the kernel through `<root>/unexport`.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::ActuatorSink;
use crate::config::GpioSettings;

pub const DEFAULT_LIGHT_PIN: u32 = 18;
pub const DEFAULT_FAN_PIN: u32 = 19;
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

#[derive(Debug)]
struct OutputLine {
    pin: u32,
    root: PathBuf,
    value_path: PathBuf,
}

impl OutputLine {
    fn open(root: &Path, pin: u32) -> Result<Self> {
        let dir = root.join(format!("gpio{}", pin));
        if !dir.exists() {
            let export = root.join("export");
            std::fs::write(&export, pin.to_string())
                .with_context(|| format!("failed to export GPIO {} via {}", pin, export.display()))?;
        }
        if !dir.exists() {
            return Err(anyhow!("GPIO {} did not appear under {}", pin, root.display()));
        }
        std::fs::write(dir.join("direction"), "out")
            .with_context(|| format!("failed to set GPIO {} direction", pin))?;
        Ok(Self {
            pin,
            root: root.to_path_buf(),
            value_path: dir.join("value"),
        })
    }

    fn release(&self) -> Result<()> {
        let unexport = self.root.join("unexport");
        std::fs::write(&unexport, self.pin.to_string()).with_context(|| {
            format!("failed to unexport GPIO {} via {}", self.pin, unexport.display())
        })
    }

    fn write(&self, high: bool) -> Result<()> {
        std::fs::write(&self.value_path, if high { "1" } else { "0" })
            .with_context(|| format!("failed to drive GPIO {}", self.pin))
    }
}

/// Lights and fans relays.
#[derive(Debug)]
pub struct GpioRelay {
    lights: OutputLine,
    fans: OutputLine,
}

impl GpioRelay {
    /// Export and configure both lines, then switch both loads on.
    pub fn open(settings: &GpioSettings) -> Result<Self> {
        if settings.light_pin == settings.fan_pin {
            return Err(anyhow!(
                "light and fan relays must use different pins (both {})",
                settings.light_pin
            ));
        }
        let relay = Self {
            lights: OutputLine::open(&settings.sysfs_root, settings.light_pin)?,
            fans: OutputLine::open(&settings.sysfs_root, settings.fan_pin)?,
        };
        relay.drive(true)?;
        log::info!(
            "GPIO relays ready (lights pin {}, fans pin {})",
            settings.light_pin,
            settings.fan_pin
        );
        Ok(relay)
    }

    fn drive(&self, on: bool) -> Result<()> {
        // Both lines are attempted even if the first one fails.
        let lights = self.lights.write(on);
        let fans = self.fans.write(on);
        lights.and(fans)
    }
}

impl ActuatorSink for GpioRelay {
    fn name(&self) -> &str {
        "gpio"
    }

    fn turn_on(&mut self) -> Result<()> {
        self.drive(true)
    }

    fn turn_off(&mut self) -> Result<()> {
        self.drive(false)
    }

    fn shutdown(&mut self) -> Result<()> {
        let lights = self.lights.release();
        let fans = self.fans.release();
        log::info!("GPIO relays released");
        lights.and(fans)
    }
}
