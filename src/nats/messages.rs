use serde::{Deserialize, Serialize};

/// Opens a recognition session on the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct RecognitionStartMessage {
    pub session_id: String,
    pub device_id: String,
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration: u32,
    pub timestamp: String, // RFC3339 timestamp
}

/// Audio frame published to the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u32,
    pub audio: String, // Base64-encoded frame bytes
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Transcript message received from the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}
