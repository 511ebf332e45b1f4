use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use energy_saver::config::{Mode, SaverConfig};
use energy_saver::EvidenceLogging;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SAVER_CONFIG",
        "SAVER_CAMERA_INDEX",
        "SAVER_CAMERA_DEVICE",
        "SAVER_TIMEOUT_SECS",
        "SAVER_MIN_AREA",
        "SAVER_SENSITIVITY",
        "SAVER_EVENTS_PATH",
        "SAVER_EVIDENCE_LOGGING",
        "SAVER_MQTT_BROKER",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "mode": "demo",
        "camera": { "index": 2, "width": 320, "height": 240, "target_fps": 15 },
        "detection": { "min_region_area": 800, "sensitivity": 40.0, "interval_ms": 500 },
        "events_path": "classroom_events.json",
        "gpio": { "enabled": true, "light_pin": 5, "fan_pin": 6 },
        "mqtt": { "topic_prefix": "room101" }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SAVER_CONFIG", file.path());
    std::env::set_var("SAVER_MIN_AREA", "1500");
    std::env::set_var("SAVER_EVIDENCE_LOGGING", "transitions_only");
    std::env::set_var("SAVER_MQTT_BROKER", "mqtt://localhost:1883");

    let cfg = SaverConfig::load().expect("load config");

    assert_eq!(cfg.mode, Mode::Demo);
    assert_eq!(cfg.no_motion_timeout, Duration::from_secs(10));
    assert_eq!(cfg.camera.index, 2);
    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.detection.min_region_area, 1500);
    assert_eq!(cfg.detection.sensitivity, 40.0);
    assert_eq!(cfg.detection_interval, Duration::from_millis(500));
    assert_eq!(cfg.events_path.to_str(), Some("classroom_events.json"));
    assert_eq!(cfg.evidence_logging, EvidenceLogging::TransitionsOnly);
    assert!(cfg.gpio.enabled);
    assert_eq!((cfg.gpio.light_pin, cfg.gpio.fan_pin), (5, 6));
    assert_eq!(cfg.mqtt.broker.as_deref(), Some("mqtt://localhost:1883"));
    assert_eq!(cfg.mqtt.topic_prefix, "room101");

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
no_motion_timeout_secs = 120

[camera]
device = "stub://classroom"

[detection]
kernel_size = 3
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("SAVER_CONFIG", file.path());
    std::env::set_var("SAVER_TIMEOUT_SECS", "90");

    let cfg = SaverConfig::load().expect("load config");
    assert_eq!(cfg.mode, Mode::Production);
    assert_eq!(cfg.camera.device, "stub://classroom");
    assert_eq!(cfg.detection.kernel_size, 3);
    assert_eq!(cfg.no_motion_timeout, Duration::from_secs(90));

    clear_env();
}

#[test]
fn invalid_overrides_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SAVER_TIMEOUT_SECS", "soon");
    let err = SaverConfig::load().expect_err("bad timeout");
    assert!(err.to_string().contains("SAVER_TIMEOUT_SECS"));

    std::env::set_var("SAVER_TIMEOUT_SECS", "0");
    let err = SaverConfig::load().expect_err("zero timeout");
    assert!(err.to_string().contains("greater than zero"));

    clear_env();
}
