//! Data-plane transport sessions
//!
//! The gateway never touches encrypted audio packets itself. It asks a
//! [`Transport`] to allocate a session (identifier, AES key, nonce seed),
//! binds the device's handler to it so inbound frames can be routed without
//! a registry lookup, and closes it when the device session is reclaimed.

mod udp;

pub use udp::UdpSessionTable;

use crate::error::Result;
use crate::session::SessionHandler;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Public endpoint devices send encrypted audio to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEndpoint {
    pub host: String,
    pub port: u16,
}

/// One allocated data-plane session
pub struct TransportSession {
    /// Opaque session identifier, echoed to the device as `session_id`
    pub id: String,

    /// Control-plane topic the session was allocated for
    pub topic: String,

    /// AES-128 key for this session
    pub key: [u8; 16],

    /// Random per-session nonce seed
    pub nonce: [u8; 8],

    pub created_at: DateTime<Utc>,

    /// Back-reference to the bound handler; weak so the handler owns the session, not the reverse
    handler: RwLock<Option<Weak<dyn SessionHandler>>>,
}

impl TransportSession {
    pub fn new(id: String, topic: String, key: [u8; 16], nonce: [u8; 8]) -> Self {
        Self {
            id,
            topic,
            key,
            nonce,
            created_at: Utc::now(),
            handler: RwLock::new(None),
        }
    }

    /// Route future inbound data for this session to `handler`
    pub fn bind_handler(&self, handler: &Arc<dyn SessionHandler>) {
        *self.handler.write() = Some(Arc::downgrade(handler));
    }

    /// The bound handler, if one is bound and still alive
    pub fn handler(&self) -> Option<Arc<dyn SessionHandler>> {
        self.handler.read().as_ref().and_then(Weak::upgrade)
    }

    fn unbind(&self) {
        self.handler.write().take();
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Allocator for data-plane sessions
pub trait Transport: Send + Sync {
    /// Allocate a session for the device publishing on `topic`
    fn create_session(&self, topic: &str) -> Option<Arc<TransportSession>>;

    /// Release a session; closing an unknown session is not an error
    fn close_session(&self, session_id: &str) -> Result<()>;

    /// Endpoint advertised to devices in the hello reply
    fn endpoint(&self) -> TransportEndpoint;
}
