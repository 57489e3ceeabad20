use super::{
    AudioChunk, RecognitionConnection, RecognitionConnectionFactory, RecognitionRequest,
    RecognitionResponse, StreamingTranscript,
};
use crate::error::{GatewayError, Result};
use crate::protocol::AudioParams;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the response and transcript buffers of one request
pub const DEFAULT_RESULT_BUFFER: usize = 10;

/// Lifecycle of one recognition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionState {
    Connecting,
    Initializing,
    Streaming,
    Closing,
    Closed,
}

/// Starts recognition requests against a backend
#[derive(Clone)]
pub struct StreamingRecognizer {
    factory: Arc<dyn RecognitionConnectionFactory>,
    buffer: usize,
}

impl StreamingRecognizer {
    pub fn new(factory: Arc<dyn RecognitionConnectionFactory>, buffer: usize) -> Self {
        Self {
            factory,
            buffer: buffer.max(1),
        }
    }

    /// Open a recognition request for `device_id` fed by `audio` in `format`.
    ///
    /// Connection and initialization failures are returned to the caller; a
    /// connection that opened but failed to initialize is closed first. Once
    /// streaming, the request runs until a terminal transcript, backend
    /// closure, or cancellation of `cancel`.
    pub async fn recognize(
        &self,
        device_id: &str,
        format: &AudioParams,
        cancel: CancellationToken,
        audio: mpsc::Receiver<AudioChunk>,
    ) -> Result<TranscriptStream> {
        let request = RecognitionRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            format: format.clone(),
        };
        let request_id = request.request_id.clone();
        let (state_tx, state_rx) = watch::channel(RecognitionState::Connecting);

        let mut connection = self.factory.create(&request);

        if let Err(e) = connection.open(&cancel).await {
            error!(
                "Recognition connect failed for device {} (request {}): {}",
                device_id, request_id, e
            );
            return Err(GatewayError::Connect(e.to_string()));
        }

        state_tx.send_replace(RecognitionState::Initializing);
        if let Err(e) = connection.send_init_handshake(&cancel).await {
            error!(
                "Recognition init failed for device {} (request {}): {}",
                device_id, request_id, e
            );
            if let Err(close_err) = connection.close().await {
                warn!("Failed to close uninitialized recognition connection: {}", close_err);
            }
            return Err(GatewayError::Initialize(e.to_string()));
        }

        let connection: Arc<dyn RecognitionConnection> = Arc::from(connection);
        state_tx.send_replace(RecognitionState::Streaming);
        info!(
            "Recognition streaming for device {} (request {})",
            device_id, request_id
        );

        let (response_tx, response_rx) = mpsc::channel(self.buffer);
        let (transcript_tx, transcript_rx) = mpsc::channel(self.buffer);

        let teardown = Arc::new(Teardown {
            fired: AtomicBool::new(false),
            connection: Arc::clone(&connection),
            cancel: cancel.clone(),
            state: state_tx,
            request_id: request_id.clone(),
        });

        // Audio forwarder
        {
            let connection = Arc::clone(&connection);
            let cancel = cancel.clone();
            let request_id = request_id.clone();
            tokio::spawn(async move {
                match connection.stream_audio(cancel, audio, response_tx).await {
                    Ok(()) => debug!("Audio forwarder finished (request {})", request_id),
                    Err(e) => error!("Audio forwarder failed (request {}): {}", request_id, e),
                }
            });
        }

        // Result receiver
        tokio::spawn(receive_results(
            cancel.clone(),
            response_rx,
            transcript_tx,
            Arc::clone(&teardown),
        ));

        Ok(TranscriptStream {
            transcripts: transcript_rx,
            state: state_rx,
            cancel,
            teardown,
        })
    }
}

/// Output side of one recognition request.
///
/// Dropping the stream cancels the request.
pub struct TranscriptStream {
    transcripts: mpsc::Receiver<StreamingTranscript>,
    state: watch::Receiver<RecognitionState>,
    cancel: CancellationToken,
    teardown: Arc<Teardown>,
}

impl TranscriptStream {
    /// Next transcript, or `None` once the request has ended
    pub async fn recv(&mut self) -> Option<StreamingTranscript> {
        self.transcripts.recv().await
    }

    pub fn state(&self) -> RecognitionState {
        *self.state.borrow()
    }

    pub fn request_id(&self) -> &str {
        &self.teardown.request_id
    }

    /// Wait until the request has fully closed
    pub async fn closed(&mut self) {
        // Err means the teardown is gone, which only happens after it ran
        let _ = self
            .state
            .wait_for(|state| *state == RecognitionState::Closed)
            .await;
    }

    /// End the request now
    pub async fn close(&self) {
        self.teardown.run().await;
    }
}

impl Drop for TranscriptStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Single-shot teardown shared by every trigger that can end a request
struct Teardown {
    fired: AtomicBool,
    connection: Arc<dyn RecognitionConnection>,
    cancel: CancellationToken,
    state: watch::Sender<RecognitionState>,
    request_id: String,
}

impl Teardown {
    async fn run(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }

        self.state.send_replace(RecognitionState::Closing);
        self.cancel.cancel();

        if let Err(e) = self.connection.close().await {
            warn!(
                "Failed to close recognition connection (request {}): {}",
                self.request_id, e
            );
        }

        self.state.send_replace(RecognitionState::Closed);
        debug!("Recognition request {} closed", self.request_id);
    }
}

async fn receive_results(
    cancel: CancellationToken,
    mut responses: mpsc::Receiver<Result<RecognitionResponse>>,
    transcripts: mpsc::Sender<StreamingTranscript>,
    teardown: Arc<Teardown>,
) {
    loop {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Result receiver cancelled (request {})", teardown.request_id);
                break;
            }
            response = responses.recv() => response,
        };

        let response = match response {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                warn!(
                    "Dropping undecodable recognition frame (request {}): {}",
                    teardown.request_id, e
                );
                continue;
            }
            None => {
                debug!("Recognition connection closed (request {})", teardown.request_id);
                break;
            }
        };

        if !response.text.is_empty() {
            let transcript = StreamingTranscript {
                text: response.text,
                is_final: response.is_final,
            };

            let delivered = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                sent = transcripts.send(transcript) => sent.is_ok(),
            };
            if !delivered {
                break;
            }
        }

        if response.is_final {
            break;
        }
    }

    drop(transcripts);
    teardown.run().await;
}
