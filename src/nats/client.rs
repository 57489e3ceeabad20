use crate::control::ControlPlane;
use crate::error::{GatewayError, Result};
use crate::protocol::topic_to_subject;
use anyhow::Context;
use async_nats::Client;
use serde::Serialize;
use tracing::{debug, info};

/// Shared NATS connection used for the device control plane and the STT bus
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Publish raw bytes to a dotted subject
    pub async fn publish_bytes(&self, subject: String, payload: Vec<u8>) -> Result<()> {
        let len = payload.len();
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| GatewayError::publish(format!("{}: {}", subject, e)))?;

        debug!("Published {} bytes to {}", len, subject);
        Ok(())
    }

    /// Serialize `message` as JSON and publish it to a dotted subject
    pub async fn publish_json<T: Serialize>(&self, subject: String, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.publish_bytes(subject, payload).await
    }

    /// Subscribe to a dotted subject (wildcards allowed)
    pub async fn subscribe(&self, subject: String) -> anyhow::Result<async_nats::Subscriber> {
        info!("Subscribing to {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;

        info!("Subscribed to {}", subject);

        Ok(subscriber)
    }

    /// Flush pending publishes before shutdown
    pub async fn flush(&self) -> anyhow::Result<()> {
        info!("Flushing NATS connection");
        self.client.flush().await.context("Failed to flush NATS")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ControlPlane for NatsClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.publish_bytes(topic_to_subject(topic), payload).await
    }
}
