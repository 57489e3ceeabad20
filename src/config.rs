use crate::asr::{RecognitionSubjects, DEFAULT_RESULT_BUFFER};
use crate::gateway::GatewaySettings;
use crate::protocol::AudioParams;
use crate::session::DEFAULT_SWEEP_INTERVAL;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    pub udp: UdpConfig,
    pub audio: AudioConfig,
    pub supervisor: SupervisorConfig,
    pub recognition: RecognitionConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    /// Subject devices publish control messages on (wildcards allowed)
    pub control_subject: String,
    /// Prefix of per-device reply topics; the raw device address is appended
    pub publish_prefix: String,
    pub device_active_subject: String,
    pub device_inactive_subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdpConfig {
    /// Host advertised to devices in the hello reply
    pub external_host: String,
    pub external_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Defaults for input fields a device leaves out of its hello
    pub input: AudioParams,
    /// Format the gateway sends back to devices
    pub output: AudioParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    pub interval_secs: u64,
    /// Devices silent for longer than this are reclaimed
    pub freshness_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    pub start_subject: String,
    pub audio_prefix: String,
    pub transcript_prefix: String,
    pub result_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Config {
    /// Load `path` (any format the config crate understands, extension
    /// optional) over built-in defaults, then apply `GATEWAY__*` environment
    /// overrides. A missing file is not an error.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Self::defaults()?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> Result<Self> {
        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.supervisor.interval_secs > 0,
            "supervisor.interval_secs must be greater than zero"
        );
        Ok(())
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("service.name", "device-gateway")?
            .set_default("service.log_level", "info")?
            .set_default("nats.url", "nats://localhost:4222")?
            .set_default("nats.control_subject", "p2p.device_public.*")?
            .set_default("nats.publish_prefix", "devices/p2p/")?
            .set_default("nats.device_active_subject", "device.active")?
            .set_default("nats.device_inactive_subject", "device.inactive")?
            .set_default("udp.external_host", "127.0.0.1")?
            .set_default("udp.external_port", 8990_i64)?
            .set_default("audio.input.format", "opus")?
            .set_default("audio.input.sample_rate", 16000_i64)?
            .set_default("audio.input.channels", 1_i64)?
            .set_default("audio.input.frame_duration", 60_i64)?
            .set_default("audio.output.format", "opus")?
            .set_default("audio.output.sample_rate", 24000_i64)?
            .set_default("audio.output.channels", 1_i64)?
            .set_default("audio.output.frame_duration", 60_i64)?
            .set_default("supervisor.interval_secs", DEFAULT_SWEEP_INTERVAL.as_secs() as i64)?
            .set_default("supervisor.freshness_secs", 120_i64)?
            .set_default("recognition.start_subject", "stt.session.start")?
            .set_default("recognition.audio_prefix", "audio.frame")?
            .set_default("recognition.transcript_prefix", "stt.text")?
            .set_default("recognition.result_buffer", DEFAULT_RESULT_BUFFER as i64)?
            .set_default("http.bind", "0.0.0.0")?
            .set_default("http.port", 8080_i64)?)
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            reply_prefix: self.nats.publish_prefix.clone(),
            input_defaults: self.audio.input.clone(),
            output_format: self.audio.output.clone(),
            freshness_window: Duration::from_secs(self.supervisor.freshness_secs),
        }
    }

    pub fn recognition_subjects(&self) -> RecognitionSubjects {
        RecognitionSubjects {
            start_subject: self.recognition.start_subject.clone(),
            audio_prefix: self.recognition.audio_prefix.clone(),
            transcript_prefix: self.recognition.transcript_prefix.clone(),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.supervisor.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load("config/does-not-exist").unwrap();

        assert_eq!(cfg.service.name, "device-gateway");
        assert_eq!(cfg.udp.external_port, 8990);
        assert_eq!(cfg.audio.input.sample_rate, 16000);
        assert_eq!(cfg.audio.output.frame_duration, 60);
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(10));
        assert_eq!(cfg.recognition.result_buffer, 10);
        assert_eq!(cfg.gateway_settings().reply_prefix, "devices/p2p/");
    }

    #[test]
    fn test_zero_sweep_interval_is_rejected() {
        let settings = Config::defaults()
            .unwrap()
            .set_override("supervisor.interval_secs", 0_i64)
            .unwrap()
            .build()
            .unwrap();

        let err = Config::from_settings(settings).unwrap_err();
        assert!(err.to_string().contains("interval_secs"));
    }
}
