use crate::protocol::AudioParams;
use crate::transport::TransportSession;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// State of one device's live interaction, created at handshake time
#[derive(Debug)]
pub struct DeviceSession {
    /// Canonical device identifier (`AA:BB:...`)
    pub device_id: String,

    /// Where replies for this device are published
    pub reply_topic: String,

    /// Allocated data-plane session (id, key, nonce seed)
    pub transport: Arc<TransportSession>,

    /// Audio format the device sends
    pub input_format: AudioParams,

    /// Audio format the gateway sends back
    pub output_format: AudioParams,

    pub created_at: DateTime<Utc>,

    /// Last activity, milliseconds since the Unix epoch
    last_active_ms: AtomicI64,
}

impl DeviceSession {
    pub fn new(
        device_id: String,
        reply_topic: String,
        transport: Arc<TransportSession>,
        input_format: AudioParams,
        output_format: AudioParams,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            device_id,
            reply_topic,
            transport,
            input_format,
            output_format,
            created_at,
            last_active_ms: AtomicI64::new(created_at.timestamp_millis()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.transport.id
    }

    pub fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    /// Active while the last activity is no older than `window`
    pub fn is_active(&self, window: Duration) -> bool {
        let idle_ms = Utc::now().timestamp_millis() - self.last_active_ms.load(Ordering::SeqCst);
        idle_ms <= window.as_millis() as i64
    }

    #[cfg(test)]
    fn set_last_active_ms(&self, ms: i64) {
        self.last_active_ms.store(ms, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> DeviceSession {
        let transport = Arc::new(TransportSession::new(
            "s-1".to_string(),
            "/p2p/device_public/AA_BB".to_string(),
            [0; 16],
            [0; 8],
        ));
        DeviceSession::new(
            "AA:BB".to_string(),
            "devices/p2p/AA_BB".to_string(),
            transport,
            AudioParams::default(),
            AudioParams::default(),
        )
    }

    #[test]
    fn test_fresh_session_is_active() {
        let session = session();
        assert!(session.is_active(Duration::from_secs(120)));
        assert_eq!(session.session_id(), "s-1");
    }

    #[test]
    fn test_stale_session_becomes_active_again_on_touch() {
        let session = session();
        let stale = Utc::now().timestamp_millis() - 10 * 60 * 1000;
        session.set_last_active_ms(stale);
        assert!(!session.is_active(Duration::from_secs(120)));

        session.touch();
        assert!(session.is_active(Duration::from_secs(120)));
    }
}
