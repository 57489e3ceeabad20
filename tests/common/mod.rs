// In-memory stand-ins for the gateway's collaborators (control plane,
// transport, recognition backend, session handler), shared by the
// integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use device_gateway::asr::{
    AudioChunk, RecognitionConnection, RecognitionConnectionFactory, RecognitionRequest,
    RecognitionResponse, ResponseSink,
};
use device_gateway::transport::{Transport, TransportEndpoint, TransportSession};
use device_gateway::{
    AudioParams, ControlPlane, DeviceEvents, Gateway, GatewayError, GatewaySettings, Result,
    SessionHandler, SessionReaper, SessionRegistry, StreamingRecognizer, UdpSessionTable,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const REPLY_PREFIX: &str = "devices/p2p/";
pub const ACTIVE_SUBJECT: &str = "device.active";
pub const INACTIVE_SUBJECT: &str = "device.inactive";

/// Poll `condition` every 10ms for up to 2 seconds
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ============================================================================
// Control plane
// ============================================================================

#[derive(Default)]
pub struct RecordingControlPlane {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail: AtomicBool,
}

impl RecordingControlPlane {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.published.lock().len()
    }

    /// JSON payloads published to `topic`, in order
    pub fn messages_to(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| serde_json::from_slice(payload).expect("published payload is JSON"))
            .collect()
    }
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::publish("broker unavailable"));
        }
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Transport that records closes and can be told to fail them or allocation
#[derive(Default)]
pub struct FakeTransport {
    pub closed: Mutex<Vec<String>>,
    pub fail_close: AtomicBool,
    pub fail_create: AtomicBool,
    allocated: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().clone()
    }
}

impl Transport for FakeTransport {
    fn create_session(&self, topic: &str) -> Option<Arc<TransportSession>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return None;
        }
        let n = self.allocated.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(TransportSession::new(
            format!("session-{}", n),
            topic.to_string(),
            [0x11; 16],
            [0x22; 8],
        )))
    }

    fn close_session(&self, session_id: &str) -> Result<()> {
        self.closed.lock().push(session_id.to_string());
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(GatewayError::stream("transport close failed"));
        }
        Ok(())
    }

    fn endpoint(&self) -> TransportEndpoint {
        TransportEndpoint {
            host: "192.0.2.10".to_string(),
            port: 8990,
        }
    }
}

// ============================================================================
// Recognition backend
// ============================================================================

/// Counters shared by every connection a [`ScriptedFactory`] creates
#[derive(Default)]
pub struct ConnectionProbe {
    pub opens: AtomicUsize,
    pub inits: AtomicUsize,
    pub closes: AtomicUsize,
    pub frames: Mutex<Vec<AudioChunk>>,
    pub requests: Mutex<Vec<RecognitionRequest>>,
}

impl ConnectionProbe {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.frames.lock().len()
    }
}

/// How scripted connections behave
#[derive(Clone, Default)]
pub struct Script {
    pub fail_open: bool,
    pub fail_init: bool,
    /// Block initialization until cancelled
    pub stall_init: bool,
    /// Responses delivered as soon as streaming starts
    pub responses: Vec<std::result::Result<RecognitionResponse, String>>,
    /// Keep the response path open until cancelled, even after the audio ends
    pub hold_open: bool,
}

pub struct ScriptedFactory {
    pub probe: Arc<ConnectionProbe>,
    script: Script,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            probe: Arc::new(ConnectionProbe::default()),
            script,
        })
    }
}

impl RecognitionConnectionFactory for ScriptedFactory {
    fn create(&self, request: &RecognitionRequest) -> Box<dyn RecognitionConnection> {
        self.probe.requests.lock().push(request.clone());
        Box::new(ScriptedConnection {
            probe: Arc::clone(&self.probe),
            script: self.script.clone(),
        })
    }
}

struct ScriptedConnection {
    probe: Arc<ConnectionProbe>,
    script: Script,
}

#[async_trait]
impl RecognitionConnection for ScriptedConnection {
    async fn open(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_open {
            return Err(GatewayError::Connect("connection refused".to_string()));
        }
        Ok(())
    }

    async fn send_init_handshake(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.probe.inits.fetch_add(1, Ordering::SeqCst);
        if self.script.stall_init {
            cancel.cancelled().await;
            return Err(GatewayError::Initialize("cancelled while initializing".to_string()));
        }
        if self.script.fail_init {
            return Err(GatewayError::Initialize("rejected".to_string()));
        }
        Ok(())
    }

    async fn stream_audio(
        &self,
        cancel: CancellationToken,
        mut audio: mpsc::Receiver<AudioChunk>,
        sink: ResponseSink,
    ) -> Result<()> {
        for response in self.script.responses.clone() {
            let response = response.map_err(GatewayError::stream);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                sent = sink.send(response) => if sent.is_err() { return Ok(()) },
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                frame = audio.recv() => match frame {
                    Some(frame) => self.probe.frames.lock().push(frame),
                    None => break,
                },
            }
        }

        if self.script.hold_open {
            cancel.cancelled().await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn partial(text: &str) -> std::result::Result<RecognitionResponse, String> {
    Ok(RecognitionResponse {
        text: text.to_string(),
        is_final: false,
    })
}

pub fn terminal(text: &str) -> std::result::Result<RecognitionResponse, String> {
    Ok(RecognitionResponse {
        text: text.to_string(),
        is_final: true,
    })
}

// ============================================================================
// Session handler
// ============================================================================

/// Handler whose liveness is set by the test and which counts teardown calls
pub struct FakeHandler {
    device_id: String,
    session_id: String,
    pub active: AtomicBool,
    pub cancels: AtomicUsize,
    pub destroys: AtomicUsize,
    pub dispatched: AtomicUsize,
}

impl FakeHandler {
    pub fn new(device_id: &str, session_id: &str) -> Arc<Self> {
        Arc::new(Self {
            device_id: device_id.to_string(),
            session_id: session_id.to_string(),
            active: AtomicBool::new(true),
            cancels: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            dispatched: AtomicUsize::new(0),
        })
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionHandler for FakeHandler {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn update_last_active(&self) {}

    fn start(&self) {}

    async fn dispatch(&self, _payload: &[u8]) {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
    }

    fn push_audio(&self, _frame: Vec<u8>) -> bool {
        false
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Assembled gateway
// ============================================================================

pub fn settings() -> GatewaySettings {
    GatewaySettings {
        reply_prefix: REPLY_PREFIX.to_string(),
        input_defaults: AudioParams::default(),
        output_format: AudioParams {
            format: "opus".to_string(),
            sample_rate: 24000,
            channels: 1,
            frame_duration: 60,
        },
        freshness_window: Duration::from_secs(120),
    }
}

pub fn reaper(
    registry: &Arc<SessionRegistry>,
    transport: Arc<dyn Transport>,
    control: &Arc<RecordingControlPlane>,
) -> SessionReaper {
    let control: Arc<dyn ControlPlane> = control.clone();
    let events = DeviceEvents::new(control, ACTIVE_SUBJECT.to_string(), INACTIVE_SUBJECT.to_string());
    SessionReaper::new(Arc::clone(registry), transport, events)
}

/// A gateway over a real UDP session table with a recording control plane
pub struct Harness {
    pub gateway: Arc<Gateway>,
    pub registry: Arc<SessionRegistry>,
    pub transport: Arc<UdpSessionTable>,
    pub control: Arc<RecordingControlPlane>,
    pub probe: Arc<ConnectionProbe>,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let transport = Arc::new(UdpSessionTable::new("192.0.2.10".to_string(), 8990));
        let control = RecordingControlPlane::new();
        let factory = ScriptedFactory::new(script);
        let probe = Arc::clone(&factory.probe);

        let gateway = Arc::new(Gateway::new(
            reaper(&registry, transport.clone(), &control),
            transport.clone(),
            control.clone(),
            StreamingRecognizer::new(factory, 10),
            settings(),
        ));

        Self {
            gateway,
            registry,
            transport,
            control,
            probe,
        }
    }
}
