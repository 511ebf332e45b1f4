//! MQTT relay commands.
//!
//! Publishes `ON`/`OFF` (retained, QoS 1) to `<prefix>/lights` and
//! `<prefix>/fans`, and keeps `<prefix>/availability` at `online` while
//! connected, with a last will of `offline`.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Connection, Event, MqttOptions};
use rumqttc::Transport;
use std::time::Duration;

use super::ActuatorSink;
use crate::config::MqttSettings;

pub const DEFAULT_TOPIC_PREFIX: &str = "classroom";
pub const DEFAULT_CLIENT_ID: &str = "energy_saver";
const DEFAULT_PORT: u16 = 1883;
const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse `host[:port]`, optionally prefixed with `mqtt://` or `mqtts://`.
pub fn parse_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }
    if remainder.is_empty() {
        return Err(anyhow!("empty MQTT broker address"));
    }

    let (host, port) = split_host_port(remainder)?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = match rest.strip_prefix(':') {
            Some(port) => port.parse().context("invalid MQTT port")?,
            None => DEFAULT_PORT,
        };
        return Ok((host.to_string(), port));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), port.parse().context("invalid MQTT port")?)),
        None => Ok((addr.to_string(), DEFAULT_PORT)),
    }
}

pub struct MqttPublisher {
    client: Client,
    connection_handle: Option<std::thread::JoinHandle<()>>,
    lights_topic: String,
    fans_topic: String,
    availability_topic: String,
}

impl MqttPublisher {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let broker = settings
            .broker
            .as_deref()
            .ok_or_else(|| anyhow!("MQTT broker address is not configured"))?;
        let endpoint = parse_endpoint(broker)?;
        let prefix = settings.topic_prefix.trim_end_matches('/');
        let availability_topic = format!("{}/availability", prefix);

        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        options.set_last_will(LastWill::new(
            &availability_topic,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        ));
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, connection) = Client::new(options, 10);
        let publisher = Self {
            client,
            connection_handle: Some(spawn_connection(connection)),
            lights_topic: format!("{}/lights", prefix),
            fans_topic: format!("{}/fans", prefix),
            availability_topic,
        };
        publisher.publish(&publisher.availability_topic, PAYLOAD_ONLINE)?;
        log::info!(
            "MQTT actuator using {}:{} (TLS: {}) with topic prefix {}",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            prefix
        );
        Ok(publisher)
    }

    fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, true, payload.as_bytes().to_vec())
            .map_err(|e| anyhow!("MQTT publish to {} failed: {}", topic, e))
    }

    fn switch(&self, payload: &str) -> Result<()> {
        let lights = self.publish(&self.lights_topic, payload);
        let fans = self.publish(&self.fans_topic, payload);
        lights.and(fans)
    }
}

fn spawn_connection(mut connection: Connection) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("MQTT connection error: {}", e);
                    break;
                }
            }
        }
    })
}

impl ActuatorSink for MqttPublisher {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn turn_on(&mut self) -> Result<()> {
        self.switch("ON")
    }

    fn turn_off(&mut self) -> Result<()> {
        self.switch("OFF")
    }

    fn shutdown(&mut self) -> Result<()> {
        let offline = self.publish(&self.availability_topic, PAYLOAD_OFFLINE);
        self.client.disconnect()?;
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_defaults_to_plain_1883() -> Result<()> {
        let ep = parse_endpoint("localhost")?;
        assert_eq!(ep.host, "localhost");
        assert_eq!(ep.port, 1883);
        assert!(!ep.use_tls);
        Ok(())
    }

    #[test]
    fn endpoint_scheme_and_port() -> Result<()> {
        let ep = parse_endpoint("mqtts://broker.local:8883")?;
        assert_eq!((ep.host.as_str(), ep.port, ep.use_tls), ("broker.local", 8883, true));
        let ep = parse_endpoint("[::1]:1884")?;
        assert_eq!((ep.host.as_str(), ep.port), ("::1", 1884));
        Ok(())
    }

    #[test]
    fn endpoint_rejects_bad_input() {
        assert!(parse_endpoint("ws://broker:80").is_err());
        assert!(parse_endpoint("broker:notaport").is_err());
        assert!(parse_endpoint("mqtt://").is_err());
    }
}
