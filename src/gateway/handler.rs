use crate::asr::{AudioChunk, StreamingRecognizer};
use crate::control::ControlPlane;
use crate::protocol::messages::{MESSAGE_TYPE_ABORT, MESSAGE_TYPE_LISTEN};
use crate::protocol::{ClientMessage, SttMessage};
use crate::session::{DeviceSession, SessionHandler};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Frames buffered between the data plane and the audio pump, and between
/// the pump and an active recognition request
const AUDIO_BUFFER_FRAMES: usize = 100;

/// The active recognition request of a device
struct Listening {
    generation: u64,
    /// Dropped on `listen stop` so the request sees the end of its input
    audio: Option<mpsc::Sender<AudioChunk>>,
    cancel: CancellationToken,
}

/// Handler bound to one device session.
///
/// Inbound audio from the data plane goes through a bounded channel into the
/// audio pump started by [`SessionHandler::start`]. While the device is
/// listening, the pump feeds the current recognition request and every
/// transcript is published back to the device as an `stt` message.
pub struct DeviceHandler {
    session: Arc<DeviceSession>,
    freshness: Duration,
    control: Arc<dyn ControlPlane>,
    recognizer: StreamingRecognizer,

    /// Parent of every recognition request of this session
    cancel: CancellationToken,

    inbound_tx: mpsc::Sender<AudioChunk>,
    inbound_rx: Mutex<Option<mpsc::Receiver<AudioChunk>>>,

    listening: Arc<Mutex<Option<Listening>>>,
    generation: AtomicU64,
    destroyed: AtomicBool,
}

impl DeviceHandler {
    pub fn new(
        session: DeviceSession,
        freshness: Duration,
        control: Arc<dyn ControlPlane>,
        recognizer: StreamingRecognizer,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(AUDIO_BUFFER_FRAMES);

        Self {
            session: Arc::new(session),
            freshness,
            control,
            recognizer,
            cancel: CancellationToken::new(),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            listening: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn is_listening(&self) -> bool {
        self.listening.lock().is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn start_listening(&self) {
        if self.is_destroyed() || self.cancel.is_cancelled() {
            return;
        }

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_BUFFER_FRAMES);
        let request_cancel = self.cancel.child_token();

        let generation = {
            let mut listening = self.listening.lock();
            match listening.as_ref() {
                Some(current) if current.audio.is_some() => {
                    debug!("Device {} is already listening", self.session.device_id);
                    return;
                }
                // Stopped but still waiting for its final transcript
                Some(current) => {
                    debug!(
                        "Device {} restarted listening, dropping the draining request",
                        self.session.device_id
                    );
                    current.cancel.cancel();
                }
                None => {}
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *listening = Some(Listening {
                generation,
                audio: Some(audio_tx),
                cancel: request_cancel.clone(),
            });
            generation
        };

        info!(
            "Device {} (session {}) started listening",
            self.session.device_id,
            self.session.session_id()
        );

        tokio::spawn(run_recognition(
            Arc::clone(&self.session),
            Arc::clone(&self.control),
            self.recognizer.clone(),
            Arc::clone(&self.listening),
            generation,
            request_cancel,
            audio_rx,
        ));
    }

    fn stop_listening(&self) {
        if let Some(listening) = self.listening.lock().as_mut() {
            listening.audio.take();
            debug!("Device {} stopped listening", self.session.device_id);
        }
    }

    fn abort_listening(&self) {
        if let Some(listening) = self.listening.lock().take() {
            listening.cancel.cancel();
            info!("Device {} aborted recognition", self.session.device_id);
        }
    }
}

#[async_trait::async_trait]
impl SessionHandler for DeviceHandler {
    fn device_id(&self) -> &str {
        &self.session.device_id
    }

    fn session_id(&self) -> &str {
        self.session.session_id()
    }

    fn is_active(&self) -> bool {
        !self.is_destroyed() && self.session.is_active(self.freshness)
    }

    fn update_last_active(&self) {
        self.session.touch();
    }

    fn start(&self) {
        let Some(mut inbound) = self.inbound_rx.lock().take() else {
            debug!("Audio pump for device {} already started", self.session.device_id);
            return;
        };

        let cancel = self.cancel.clone();
        let listening = Arc::clone(&self.listening);
        let device_id = self.session.device_id.clone();

        tokio::spawn(async move {
            debug!("Audio pump started for device {}", device_id);

            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = inbound.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                let current = listening.lock();
                let Some(audio) = current.as_ref().and_then(|l| l.audio.as_ref()) else {
                    continue;
                };
                if audio.try_send(frame).is_err() {
                    debug!("Recognition input full or closed for device {}, dropping frame", device_id);
                }
            }

            debug!("Audio pump stopped for device {}", device_id);
        });
    }

    async fn dispatch(&self, payload: &[u8]) {
        let message = match ClientMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "Dropping malformed message from device {}: {}",
                    self.session.device_id, e
                );
                return;
            }
        };

        match message.kind.as_str() {
            MESSAGE_TYPE_LISTEN => match message.state.as_deref() {
                Some("start") => self.start_listening(),
                Some("stop") => self.stop_listening(),
                state => debug!(
                    "Ignoring listen state {:?} from device {}",
                    state, self.session.device_id
                ),
            },
            MESSAGE_TYPE_ABORT => self.abort_listening(),
            kind => debug!(
                "Unhandled message type {} from device {}",
                kind, self.session.device_id
            ),
        }
    }

    fn push_audio(&self, frame: Vec<u8>) -> bool {
        if self.is_destroyed() {
            return false;
        }
        self.session.touch();
        self.inbound_tx.try_send(frame).is_ok()
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(listening) = self.listening.lock().take() {
            listening.cancel.cancel();
        }
        self.inbound_rx.lock().take();

        info!(
            "Destroyed handler for device {} (session {})",
            self.session.device_id,
            self.session.session_id()
        );
    }
}

async fn run_recognition(
    session: Arc<DeviceSession>,
    control: Arc<dyn ControlPlane>,
    recognizer: StreamingRecognizer,
    listening: Arc<Mutex<Option<Listening>>>,
    generation: u64,
    cancel: CancellationToken,
    audio: mpsc::Receiver<AudioChunk>,
) {
    let device_id = &session.device_id;

    match recognizer
        .recognize(device_id, &session.input_format, cancel, audio)
        .await
    {
        Ok(mut transcripts) => {
            while let Some(transcript) = transcripts.recv().await {
                debug!(
                    "Transcript for device {} (final={}): {}",
                    device_id, transcript.is_final, transcript.text
                );

                let message = SttMessage::new(session.session_id(), transcript.text, transcript.is_final);
                let payload = match serde_json::to_vec(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Failed to encode transcript for device {}: {}", device_id, e);
                        continue;
                    }
                };

                if let Err(e) = control.publish(&session.reply_topic, payload).await {
                    warn!(
                        "Failed to deliver transcript to device {} (session {}): {}",
                        device_id,
                        session.session_id(),
                        e
                    );
                }
            }
        }
        Err(e) => warn!(
            "Recognition unavailable for device {} (session {}): {}",
            device_id,
            session.session_id(),
            e
        ),
    }

    let mut current = listening.lock();
    if current.as_ref().map(|l| l.generation) == Some(generation) {
        *current = None;
    }
}
