use super::{DeviceEvents, SessionHandler, SessionRegistry};
use crate::transport::Transport;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tears down device sessions.
///
/// Every path that ends a device session (inactivity sweep, goodbye,
/// supersession by a new hello, admin disconnect) goes through here so the
/// transport session, the registry entry and the handler are released
/// together.
#[derive(Clone)]
pub struct SessionReaper {
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn Transport>,
    events: DeviceEvents,
}

impl SessionReaper {
    pub fn new(registry: Arc<SessionRegistry>, transport: Arc<dyn Transport>, events: DeviceEvents) -> Self {
        Self {
            registry,
            transport,
            events,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &DeviceEvents {
        &self.events
    }

    /// Reclaim the session `handler` holds for `device_id`.
    ///
    /// Order: close the transport session, remove the registry entry, cancel
    /// in-flight work, destroy the handler. A failed transport close is logged
    /// and the remaining steps still run. Only the caller that actually
    /// removes the entry cancels and destroys the handler; returns whether
    /// that was this call.
    pub async fn reclaim(&self, device_id: &str, handler: &Arc<dyn SessionHandler>) -> bool {
        if !self.release(device_id, handler) {
            return false;
        }

        info!(
            "Reclaimed device {} (session {})",
            device_id,
            handler.session_id()
        );
        self.events.offline(device_id, handler.session_id()).await;

        true
    }

    /// Undo a handshake that never completed.
    ///
    /// Same teardown as [`reclaim`](Self::reclaim), but no offline event: the
    /// device was never announced online.
    pub fn discard(&self, device_id: &str, handler: &Arc<dyn SessionHandler>) -> bool {
        let released = self.release(device_id, handler);
        if released {
            info!(
                "Discarded device {} (session {}) after a failed handshake",
                device_id,
                handler.session_id()
            );
        }
        released
    }

    fn release(&self, device_id: &str, handler: &Arc<dyn SessionHandler>) -> bool {
        let session_id = handler.session_id();

        if let Err(e) = self.transport.close_session(session_id) {
            warn!(
                "Failed to close transport session {} for device {}: {}",
                session_id, device_id, e
            );
        }

        if !self.registry.remove_if_same(device_id, handler) {
            debug!(
                "Device {} (session {}) was already reclaimed or superseded",
                device_id, session_id
            );
            return false;
        }

        handler.cancel();
        handler.destroy();
        true
    }

    /// Tear down a handler that a new handshake already replaced in the registry
    pub async fn retire(&self, handler: &Arc<dyn SessionHandler>) {
        let device_id = handler.device_id().to_string();
        let session_id = handler.session_id().to_string();

        if let Err(e) = self.transport.close_session(&session_id) {
            warn!(
                "Failed to close superseded transport session {} for device {}: {}",
                session_id, device_id, e
            );
        }

        handler.cancel();
        handler.destroy();

        info!("Superseded device {} (session {})", device_id, session_id);
        self.events.offline(&device_id, &session_id).await;
    }

    /// Reclaim whatever is currently bound to `device_id`
    pub async fn disconnect(&self, device_id: &str) -> bool {
        match self.registry.get(device_id) {
            Some(handler) => self.reclaim(device_id, &handler).await,
            None => false,
        }
    }
}
