use crate::control::ControlPlane;
use crate::protocol::DeviceEvent;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

/// Publishes device online/offline notifications on the control plane
#[derive(Clone)]
pub struct DeviceEvents {
    control: Arc<dyn ControlPlane>,
    active_subject: String,
    inactive_subject: String,
}

impl DeviceEvents {
    pub fn new(control: Arc<dyn ControlPlane>, active_subject: String, inactive_subject: String) -> Self {
        Self {
            control,
            active_subject,
            inactive_subject,
        }
    }

    pub async fn online(&self, device_id: &str, session_id: &str) {
        self.emit(&self.active_subject, device_id, session_id).await;
    }

    pub async fn offline(&self, device_id: &str, session_id: &str) {
        self.emit(&self.inactive_subject, device_id, session_id).await;
    }

    async fn emit(&self, subject: &str, device_id: &str, session_id: &str) {
        let event = DeviceEvent {
            device_id: device_id.to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };

        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode device event for {}: {}", device_id, e);
                return;
            }
        };

        if let Err(e) = self.control.publish(subject, payload).await {
            warn!(
                "Failed to publish {} for device {} (session {}): {}",
                subject, device_id, session_id, e
            );
        }
    }
}
