use serde::{Deserialize, Serialize};

pub const MESSAGE_TYPE_HELLO: &str = "hello";
pub const MESSAGE_TYPE_GOODBYE: &str = "goodbye";
pub const MESSAGE_TYPE_LISTEN: &str = "listen";
pub const MESSAGE_TYPE_ABORT: &str = "abort";
pub const MESSAGE_TYPE_STT: &str = "stt";

/// The only data-plane transport this gateway negotiates
pub const TRANSPORT_UDP: &str = "udp";

/// Protocol version announced in the hello reply
pub const PROTOCOL_VERSION: u32 = 3;

/// Negotiated audio format of one direction of a device session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioParams {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Frame length in milliseconds
    pub frame_duration: u32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            format: "opus".to_string(),
            sample_rate: 16000,
            channels: 1,
            frame_duration: 60,
        }
    }
}

/// Audio parameters as sent by a device; any field may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedAudioParams {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u16>,
    #[serde(default)]
    pub frame_duration: Option<u32>,
}

impl RequestedAudioParams {
    /// Fill every missing field from `defaults`
    pub fn resolve(&self, defaults: &AudioParams) -> AudioParams {
        AudioParams {
            format: self.format.clone().unwrap_or_else(|| defaults.format.clone()),
            sample_rate: self.sample_rate.unwrap_or(defaults.sample_rate),
            channels: self.channels.unwrap_or(defaults.channels),
            frame_duration: self.frame_duration.unwrap_or(defaults.frame_duration),
        }
    }
}

/// Any message a device publishes on the control plane.
///
/// Only `type` is mandatory; the remaining fields are populated depending on
/// the message type (`transport`/`audio_params` for hello, `session_id` for
/// goodbye, `state` for listen).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub audio_params: Option<RequestedAudioParams>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl ClientMessage {
    pub fn parse(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    pub fn is_hello(&self) -> bool {
        self.kind == MESSAGE_TYPE_HELLO
    }
}

/// Data-plane endpoint and key material handed to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpEndpoint {
    pub server: String,
    pub port: u16,
    /// Hex-encoded AES key
    pub key: String,
    /// Hex-encoded 16-byte composite nonce
    pub nonce: String,
}

/// Server reply to a successful hello
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    pub session_id: String,
    pub transport: String,
    pub udp: UdpEndpoint,
    pub audio_params: AudioParams,
}

impl HelloReply {
    pub fn udp(session_id: String, udp: UdpEndpoint, audio_params: AudioParams) -> Self {
        Self {
            kind: MESSAGE_TYPE_HELLO.to_string(),
            version: PROTOCOL_VERSION,
            session_id,
            transport: TRANSPORT_UDP.to_string(),
            udp,
            audio_params,
        }
    }
}

/// Recognition result pushed to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SttMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    pub text: String,
    pub is_final: bool,
}

impl SttMessage {
    pub fn new(session_id: &str, text: String, is_final: bool) -> Self {
        Self {
            kind: MESSAGE_TYPE_STT.to_string(),
            session_id: session_id.to_string(),
            text,
            is_final,
        }
    }
}

/// Device lifecycle notification (online/offline)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub device_id: String,
    pub session_id: String,
    pub timestamp: String, // RFC3339 timestamp
}
