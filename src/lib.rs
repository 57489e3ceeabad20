pub mod asr;
pub mod config;
pub mod control;
pub mod error;
pub mod gateway;
pub mod http;
pub mod nats;
pub mod protocol;
pub mod session;
pub mod transport;

pub use asr::{
    RecognitionConnection, RecognitionConnectionFactory, RecognitionResponse, StreamingRecognizer,
    StreamingTranscript, TranscriptStream,
};
pub use config::Config;
pub use control::{ControlPlane, InboundMessage};
pub use error::{GatewayError, Result};
pub use gateway::{DeviceHandler, Gateway, GatewaySettings};
pub use http::{create_router, AppState};
pub use nats::NatsClient;
pub use protocol::{AudioParams, ClientMessage, HelloReply};
pub use session::{
    DeviceEvents, DeviceSession, LivenessSupervisor, SessionHandler, SessionReaper, SessionRegistry,
};
pub use transport::{Transport, TransportSession, UdpSessionTable};
