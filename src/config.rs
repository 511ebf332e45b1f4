use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actuator::gpio::{DEFAULT_FAN_PIN, DEFAULT_LIGHT_PIN, DEFAULT_SYSFS_ROOT};
use crate::actuator::mqtt::{DEFAULT_CLIENT_ID, DEFAULT_TOPIC_PREFIX};
use crate::detect::estimator::{DEFAULT_KERNEL_SIZE, DEFAULT_MIN_REGION_AREA, DEFAULT_SENSITIVITY};
use crate::detect::EstimatorConfig;
use crate::events::DEFAULT_EVENTS_PATH;
use crate::occupancy::EvidenceLogging;

const DEFAULT_CAMERA_INDEX: u32 = 0;
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_HISTORY: u32 = 500;
const PRODUCTION_TIMEOUT_SECS: u64 = 60;
const DEMO_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DETECTION_INTERVAL_MS: u64 = 2_000;
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// Timeout preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Demo,
}

impl Mode {
    pub fn default_timeout(self) -> Duration {
        match self {
            Mode::Production => Duration::from_secs(PRODUCTION_TIMEOUT_SECS),
            Mode::Demo => Duration::from_secs(DEMO_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct SaverConfigFile {
    mode: Option<Mode>,
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    no_motion_timeout_secs: Option<u64>,
    tick_interval_ms: Option<u64>,
    events_path: Option<PathBuf>,
    evidence_logging: Option<EvidenceLogging>,
    gpio: Option<GpioConfigFile>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    index: Option<u32>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    min_region_area: Option<u32>,
    sensitivity: Option<f32>,
    history: Option<u32>,
    learning_rate: Option<f32>,
    detect_shadows: Option<bool>,
    kernel_size: Option<u32>,
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct GpioConfigFile {
    enabled: Option<bool>,
    light_pin: Option<u32>,
    fan_pin: Option<u32>,
    sysfs_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker: Option<String>,
    client_id: Option<String>,
    topic_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SaverConfig {
    pub mode: Mode,
    pub camera: CameraSettings,
    pub detection: EstimatorConfig,
    pub detection_interval: Duration,
    pub no_motion_timeout: Duration,
    pub tick_interval: Duration,
    pub events_path: PathBuf,
    pub evidence_logging: EvidenceLogging,
    pub gpio: GpioSettings,
    pub mqtt: MqttSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: u32,
    /// `/dev/videoN` for a capture device, `stub://...` for the synthetic scene.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct GpioSettings {
    pub enabled: bool,
    pub light_pin: u32,
    pub fan_pin: u32,
    pub sysfs_root: PathBuf,
}

impl Default for GpioSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            light_pin: DEFAULT_LIGHT_PIN,
            fan_pin: DEFAULT_FAN_PIN,
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Unset disables the MQTT actuator.
    pub broker: Option<String>,
    pub client_id: String,
    pub topic_prefix: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
        }
    }
}

pub fn camera_device_path(index: u32) -> String {
    format!("/dev/video{}", index)
}

impl Default for SaverConfig {
    fn default() -> Self {
        // The empty file layer has no fallible parts.
        Self::from_file(SaverConfigFile::default())
    }
}

impl SaverConfig {
    /// Optional file from `SAVER_CONFIG`, then `SAVER_*` overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SAVER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SaverConfigFile) -> Self {
        let mode = file.mode.unwrap_or_default();
        let camera_file = file.camera.unwrap_or_default();
        let index = camera_file.index.unwrap_or(DEFAULT_CAMERA_INDEX);
        let camera = CameraSettings {
            index,
            device: camera_file
                .device
                .unwrap_or_else(|| camera_device_path(index)),
            width: camera_file.width.unwrap_or(DEFAULT_FRAME_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_FRAME_HEIGHT),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        };

        let detection_file = file.detection.unwrap_or_default();
        let detection = EstimatorConfig {
            min_region_area: detection_file
                .min_region_area
                .unwrap_or(DEFAULT_MIN_REGION_AREA),
            sensitivity: detection_file.sensitivity.unwrap_or(DEFAULT_SENSITIVITY),
            history: detection_file.history.unwrap_or(DEFAULT_HISTORY),
            learning_rate: detection_file.learning_rate,
            detect_shadows: detection_file.detect_shadows.unwrap_or(true),
            kernel_size: detection_file.kernel_size.unwrap_or(DEFAULT_KERNEL_SIZE),
        };
        let detection_interval = Duration::from_millis(
            detection_file
                .interval_ms
                .unwrap_or(DEFAULT_DETECTION_INTERVAL_MS),
        );

        let gpio_file = file.gpio.unwrap_or_default();
        let gpio_defaults = GpioSettings::default();
        let gpio = GpioSettings {
            enabled: gpio_file.enabled.unwrap_or(gpio_defaults.enabled),
            light_pin: gpio_file.light_pin.unwrap_or(gpio_defaults.light_pin),
            fan_pin: gpio_file.fan_pin.unwrap_or(gpio_defaults.fan_pin),
            sysfs_root: gpio_file.sysfs_root.unwrap_or(gpio_defaults.sysfs_root),
        };

        let mqtt_file = file.mqtt.unwrap_or_default();
        let mqtt_defaults = MqttSettings::default();
        let mqtt = MqttSettings {
            broker: mqtt_file.broker.filter(|b| !b.trim().is_empty()),
            client_id: mqtt_file.client_id.unwrap_or(mqtt_defaults.client_id),
            topic_prefix: mqtt_file
                .topic_prefix
                .unwrap_or(mqtt_defaults.topic_prefix),
        };

        Self {
            mode,
            camera,
            detection,
            detection_interval,
            no_motion_timeout: file
                .no_motion_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| mode.default_timeout()),
            tick_interval: Duration::from_millis(
                file.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            ),
            events_path: file
                .events_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EVENTS_PATH)),
            evidence_logging: file.evidence_logging.unwrap_or_default(),
            gpio,
            mqtt,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(index) = std::env::var("SAVER_CAMERA_INDEX") {
            let index: u32 = index
                .trim()
                .parse()
                .map_err(|_| anyhow!("SAVER_CAMERA_INDEX must be a non-negative integer"))?;
            self.camera.index = index;
            self.camera.device = camera_device_path(index);
        }
        if let Ok(device) = std::env::var("SAVER_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(timeout) = std::env::var("SAVER_TIMEOUT_SECS") {
            let seconds: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("SAVER_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.no_motion_timeout = Duration::from_secs(seconds);
        }
        if let Ok(area) = std::env::var("SAVER_MIN_AREA") {
            self.detection.min_region_area = area
                .trim()
                .parse()
                .map_err(|_| anyhow!("SAVER_MIN_AREA must be a pixel count"))?;
        }
        if let Ok(sensitivity) = std::env::var("SAVER_SENSITIVITY") {
            self.detection.sensitivity = sensitivity
                .trim()
                .parse()
                .map_err(|_| anyhow!("SAVER_SENSITIVITY must be a number"))?;
        }
        if let Ok(path) = std::env::var("SAVER_EVENTS_PATH") {
            if !path.trim().is_empty() {
                self.events_path = PathBuf::from(path);
            }
        }
        if let Ok(mode) = std::env::var("SAVER_EVIDENCE_LOGGING") {
            self.evidence_logging = parse_evidence_logging(&mode)?;
        }
        if let Ok(broker) = std::env::var("SAVER_MQTT_BROKER") {
            if !broker.trim().is_empty() {
                self.mqtt.broker = Some(broker);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.no_motion_timeout.is_zero() {
            return Err(anyhow!("no-motion timeout must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("frame width and height must be greater than zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("target fps must be greater than zero"));
        }
        if self.detection_interval.is_zero() || self.tick_interval.is_zero() {
            return Err(anyhow!("detection and tick intervals must be greater than zero"));
        }
        if self.detection.kernel_size == 0 || self.detection.kernel_size % 2 == 0 {
            return Err(anyhow!("kernel size must be odd and at least 1"));
        }
        if self.detection.sensitivity.is_nan() || self.detection.sensitivity <= 0.0 {
            return Err(anyhow!("sensitivity must be greater than zero"));
        }
        if self.detection.history == 0 {
            return Err(anyhow!("background history must be at least one frame"));
        }
        if let Some(rate) = self.detection.learning_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(anyhow!("learning rate must be within 0..=1"));
            }
        }
        if self.mqtt.topic_prefix.trim().is_empty() {
            return Err(anyhow!("MQTT topic prefix must not be empty"));
        }
        Ok(())
    }
}

/// `every_tick` / `transitions_only`, dashes accepted.
pub fn parse_evidence_logging(value: &str) -> Result<EvidenceLogging> {
    match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "every_tick" => Ok(EvidenceLogging::EveryTick),
        "transitions_only" => Ok(EvidenceLogging::TransitionsOnly),
        other => Err(anyhow!(
            "unknown evidence logging mode {:?} (expected every_tick or transitions_only)",
            other
        )),
    }
}

fn read_config_file(path: &Path) -> Result<SaverConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_preset() -> Result<()> {
        let cfg = SaverConfig::default();
        cfg.validate()?;
        assert_eq!(cfg.mode, Mode::Production);
        assert_eq!(cfg.no_motion_timeout, Duration::from_secs(60));
        assert_eq!(cfg.camera.device, "/dev/video0");
        assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
        assert_eq!(cfg.detection.min_region_area, 1000);
        assert_eq!(cfg.detection_interval, Duration::from_secs(2));
        assert_eq!(cfg.tick_interval, Duration::from_secs(1));
        assert_eq!(cfg.evidence_logging, EvidenceLogging::EveryTick);
        assert!(!cfg.gpio.enabled);
        assert!(cfg.mqtt.broker.is_none());
        assert_eq!(cfg.mqtt.topic_prefix, "classroom");
        Ok(())
    }

    #[test]
    fn demo_mode_shortens_timeout() {
        let cfg = SaverConfig::from_file(SaverConfigFile {
            mode: Some(Mode::Demo),
            ..SaverConfigFile::default()
        });
        assert_eq!(cfg.no_motion_timeout, Duration::from_secs(10));
    }

    #[test]
    fn explicit_timeout_beats_mode() {
        let cfg = SaverConfig::from_file(SaverConfigFile {
            mode: Some(Mode::Demo),
            no_motion_timeout_secs: Some(30),
            ..SaverConfigFile::default()
        });
        assert_eq!(cfg.no_motion_timeout, Duration::from_secs(30));
    }

    #[test]
    fn validation_rejects_even_kernel() {
        let mut cfg = SaverConfig::default();
        cfg.detection.kernel_size = 4;
        assert!(cfg.validate().is_err());
        cfg.detection.kernel_size = 3;
        assert!(cfg.validate().is_ok());
        cfg.no_motion_timeout = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn evidence_logging_names() -> Result<()> {
        assert_eq!(parse_evidence_logging("every-tick")?, EvidenceLogging::EveryTick);
        assert_eq!(
            parse_evidence_logging("TRANSITIONS_ONLY")?,
            EvidenceLogging::TransitionsOnly
        );
        assert!(parse_evidence_logging("sometimes").is_err());
        Ok(())
    }
}
