//! Recognition over the NATS STT bus
//!
//! The STT service listens for a start message, then for base64 audio frames
//! on `<audio_prefix>.<request>`; it answers with partial and final
//! transcripts on `<transcript_prefix>.<request>`. An empty frame with
//! `final: true` marks the end of the audio.

use super::{
    AudioChunk, RecognitionConnection, RecognitionConnectionFactory, RecognitionRequest,
    RecognitionResponse, ResponseSink,
};
use crate::error::{GatewayError, Result};
use crate::nats::{AudioFrameMessage, NatsClient, RecognitionStartMessage, TranscriptMessage};
use base64::Engine;
use chrono::Utc;
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Subjects of the STT bus
#[derive(Debug, Clone)]
pub struct RecognitionSubjects {
    pub start_subject: String,
    pub audio_prefix: String,
    pub transcript_prefix: String,
}

/// Creates [`NatsRecognitionConnection`]s sharing one NATS client
pub struct NatsRecognitionFactory {
    client: Arc<NatsClient>,
    subjects: RecognitionSubjects,
}

impl NatsRecognitionFactory {
    pub fn new(client: Arc<NatsClient>, subjects: RecognitionSubjects) -> Self {
        Self { client, subjects }
    }
}

impl RecognitionConnectionFactory for NatsRecognitionFactory {
    fn create(&self, request: &RecognitionRequest) -> Box<dyn RecognitionConnection> {
        Box::new(NatsRecognitionConnection::new(
            Arc::clone(&self.client),
            self.subjects.clone(),
            request.clone(),
        ))
    }
}

/// One recognition request on the STT bus
pub struct NatsRecognitionConnection {
    client: Arc<NatsClient>,
    subjects: RecognitionSubjects,
    request: RecognitionRequest,
    subscriber: Mutex<Option<async_nats::Subscriber>>,
    closed: CancellationToken,
}

impl NatsRecognitionConnection {
    pub fn new(client: Arc<NatsClient>, subjects: RecognitionSubjects, request: RecognitionRequest) -> Self {
        Self {
            client,
            subjects,
            request,
            subscriber: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    fn audio_subject(&self) -> String {
        format!("{}.{}", self.subjects.audio_prefix, self.request.request_id)
    }

    fn transcript_subject(&self) -> String {
        format!("{}.{}", self.subjects.transcript_prefix, self.request.request_id)
    }

    async fn publish_frame(&self, sequence: u32, frame: &[u8], is_final: bool) -> Result<()> {
        let message = AudioFrameMessage {
            session_id: self.request.request_id.clone(),
            sequence,
            audio: base64::engine::general_purpose::STANDARD.encode(frame),
            format: self.request.format.format.clone(),
            sample_rate: self.request.format.sample_rate,
            channels: self.request.format.channels,
            timestamp: Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        self.client.publish_json(self.audio_subject(), &message).await
    }
}

fn decode_transcript(payload: &[u8]) -> Result<RecognitionResponse> {
    let transcript: TranscriptMessage = serde_json::from_slice(payload)?;
    Ok(RecognitionResponse {
        text: transcript.text,
        is_final: !transcript.partial,
    })
}

/// Next audio frame, or pending forever once the input has ended
async fn next_frame(audio: &mut Option<mpsc::Receiver<AudioChunk>>) -> Option<AudioChunk> {
    match audio {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[async_trait::async_trait]
impl RecognitionConnection for NatsRecognitionConnection {
    async fn open(&mut self, cancel: &CancellationToken) -> Result<()> {
        let subject = self.transcript_subject();

        let subscriber = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GatewayError::Connect("cancelled while connecting".to_string()));
            }
            subscriber = self.client.subscribe(subject) => {
                subscriber.map_err(|e| GatewayError::Connect(e.to_string()))?
            }
        };

        *self.subscriber.lock().await = Some(subscriber);
        Ok(())
    }

    async fn send_init_handshake(&mut self, cancel: &CancellationToken) -> Result<()> {
        let format = &self.request.format;
        let message = RecognitionStartMessage {
            session_id: self.request.request_id.clone(),
            device_id: self.request.device_id.clone(),
            format: format.format.clone(),
            sample_rate: format.sample_rate,
            channels: format.channels,
            frame_duration: format.frame_duration,
            timestamp: Utc::now().to_rfc3339(),
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GatewayError::Initialize("cancelled while initializing".to_string()));
            }
            published = self.client.publish_json(self.subjects.start_subject.clone(), &message) => {
                published.map_err(|e| GatewayError::Initialize(e.to_string()))?
            }
        }

        info!(
            "Started STT session {} for device {}",
            self.request.request_id, self.request.device_id
        );
        Ok(())
    }

    async fn stream_audio(
        &self,
        cancel: CancellationToken,
        audio: mpsc::Receiver<AudioChunk>,
        sink: ResponseSink,
    ) -> Result<()> {
        let Some(mut subscriber) = self.subscriber.lock().await.take() else {
            return Err(GatewayError::stream("connection is not open"));
        };

        let mut audio = Some(audio);
        let mut sequence: u32 = 0;
        let mut forward_error = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.closed.cancelled() => break,
                frame = next_frame(&mut audio) => match frame {
                    Some(frame) => {
                        if let Err(e) = self.publish_frame(sequence, &frame, false).await {
                            // Keep delivering transcripts; only forwarding stops
                            error!("Failed to publish audio frame (request {}): {}", self.request.request_id, e);
                            audio = None;
                            forward_error = Some(e);
                            continue;
                        }
                        sequence = sequence.wrapping_add(1);
                    }
                    None => {
                        audio = None;
                        debug!(
                            "Audio input ended after {} frames (request {})",
                            sequence, self.request.request_id
                        );
                        if let Err(e) = self.publish_frame(sequence, &[], true).await {
                            error!("Failed to publish final frame marker: {}", e);
                            forward_error = Some(e);
                        }
                    }
                },
                msg = subscriber.next() => match msg {
                    Some(msg) => {
                        if sink.send(decode_transcript(&msg.payload)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        warn!("Transcript subscription ended (request {})", self.request.request_id);
                        break;
                    }
                },
            }
        }

        match forward_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.cancel();

        if let Some(mut subscriber) = self.subscriber.lock().await.take() {
            if let Err(e) = subscriber.unsubscribe().await {
                warn!("Failed to unsubscribe {}: {}", self.transcript_subject(), e);
            }
        }

        debug!("Closed STT session {}", self.request.request_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_partial_and_final() {
        let partial = decode_transcript(
            br#"{"session_id":"r","text":"hel","partial":true,"timestamp":"2025-10-27T14:30:05Z"}"#,
        )
        .unwrap();
        assert_eq!(partial.text, "hel");
        assert!(!partial.is_final);

        let last = decode_transcript(
            br#"{"session_id":"r","text":"hello","partial":false,"timestamp":"2025-10-27T14:30:05Z","confidence":0.9}"#,
        )
        .unwrap();
        assert!(last.is_final);
    }

    #[test]
    fn test_decode_garbage_is_an_error() {
        assert!(decode_transcript(b"{").is_err());
    }
}
