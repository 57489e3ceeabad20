//! Control-plane seam
//!
//! The gateway publishes replies and lifecycle events through [`ControlPlane`]
//! and consumes [`InboundMessage`]s; the NATS client is the production
//! implementation.

use crate::error::Result;

/// Outbound side of the pub/sub control plane
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    /// Publish `payload` to `topic` (slash-separated path or dotted subject)
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
}

/// A message received on the control plane
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Addressing context, as a slash-separated path
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}
