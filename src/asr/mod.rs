//! Streaming speech recognition
//!
//! [`StreamingRecognizer`] turns one backend connection into a request:
//! audio frames in, [`StreamingTranscript`]s out, with a single idempotent
//! teardown. Backends implement [`RecognitionConnection`]; the NATS STT bus
//! backend is [`NatsRecognitionConnection`].

mod nats;
mod recognizer;

pub use nats::{NatsRecognitionConnection, NatsRecognitionFactory, RecognitionSubjects};
pub use recognizer::{RecognitionState, StreamingRecognizer, TranscriptStream, DEFAULT_RESULT_BUFFER};

use crate::error::Result;
use crate::protocol::AudioParams;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One encoded audio frame as received from the device
pub type AudioChunk = Vec<u8>;

/// Where a connection delivers decoded backend responses; `Err` marks a frame
/// that failed to decode and is skipped by the receiver.
pub type ResponseSink = mpsc::Sender<Result<RecognitionResponse>>;

/// A decoded response frame from the recognition backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResponse {
    /// Recognized text; empty for keep-alive frames
    pub text: String,
    /// Marks the final result of the utterance
    pub is_final: bool,
}

/// One unit of recognition output handed to the device pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingTranscript {
    pub text: String,
    pub is_final: bool,
}

/// A full-duplex connection to a streaming recognition backend
#[async_trait::async_trait]
pub trait RecognitionConnection: Send + Sync {
    /// Open the connection
    async fn open(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// Send the backend's session-initialization request
    async fn send_init_handshake(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// Forward `audio` to the backend and deliver backend responses to `sink`
    /// until the input ends and the backend finishes, or `cancel` fires.
    async fn stream_audio(
        &self,
        cancel: CancellationToken,
        audio: mpsc::Receiver<AudioChunk>,
        sink: ResponseSink,
    ) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Identity and audio format of one recognition request
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub request_id: String,
    pub device_id: String,
    pub format: AudioParams,
}

/// Builds one connection per recognition request
pub trait RecognitionConnectionFactory: Send + Sync {
    fn create(&self, request: &RecognitionRequest) -> Box<dyn RecognitionConnection>;
}
