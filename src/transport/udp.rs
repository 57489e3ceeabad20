use super::{Transport, TransportEndpoint, TransportSession};
use crate::error::Result;
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, info};

/// In-process table of UDP sessions.
///
/// Allocates identifiers and key material and keeps the handler binding used
/// to route decrypted frames. Packet encryption and socket handling live in
/// the data-plane codec, which calls [`UdpSessionTable::deliver`].
pub struct UdpSessionTable {
    endpoint: TransportEndpoint,
    sessions: DashMap<String, Arc<TransportSession>>,
}

impl UdpSessionTable {
    pub fn new(external_host: String, external_port: u16) -> Self {
        info!("UDP sessions advertised at {}:{}", external_host, external_port);

        Self {
            endpoint: TransportEndpoint {
                host: external_host,
                port: external_port,
            },
            sessions: DashMap::new(),
        }
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<TransportSession>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Hand one decoded audio frame to the handler bound to `session_id`.
    ///
    /// Returns false when the session is unknown, unbound, or the handler
    /// did not accept the frame.
    pub fn deliver(&self, session_id: &str, frame: Vec<u8>) -> bool {
        let Some(session) = self.session(session_id) else {
            debug!("Dropping frame for unknown session {}", session_id);
            return false;
        };

        match session.handler() {
            Some(handler) => handler.push_audio(frame),
            None => {
                debug!("Dropping frame for unbound session {}", session_id);
                false
            }
        }
    }
}

impl Transport for UdpSessionTable {
    fn create_session(&self, topic: &str) -> Option<Arc<TransportSession>> {
        let mut key = [0u8; 16];
        let mut nonce = [0u8; 8];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut nonce);

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(TransportSession::new(id.clone(), topic.to_string(), key, nonce));
        self.sessions.insert(id.clone(), Arc::clone(&session));

        info!("Allocated UDP session {} for {}", id, topic);

        Some(session)
    }

    fn close_session(&self, session_id: &str) -> Result<()> {
        match self.sessions.remove(session_id) {
            Some((_, session)) => {
                session.unbind();
                info!("Closed UDP session {}", session_id);
            }
            None => debug!("UDP session {} already closed", session_id),
        }
        Ok(())
    }

    fn endpoint(&self) -> TransportEndpoint {
        self.endpoint.clone()
    }
}
