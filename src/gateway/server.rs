use super::DeviceHandler;
use crate::asr::StreamingRecognizer;
use crate::control::{ControlPlane, InboundMessage};
use crate::error::{GatewayError, Result};
use crate::protocol::messages::{MESSAGE_TYPE_GOODBYE, MESSAGE_TYPE_HELLO, TRANSPORT_UDP};
use crate::protocol::{
    composite_nonce, parse_device_address, reply_topic, AudioParams, ClientMessage, HelloReply,
    UdpEndpoint,
};
use crate::session::{DeviceSession, SessionHandler, SessionReaper, SessionRegistry};
use crate::transport::Transport;
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handshake and routing settings
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Prefix of the per-device reply topic (`devices/p2p/`)
    pub reply_prefix: String,
    /// Used for any input audio field a device leaves out
    pub input_defaults: AudioParams,
    /// Audio format the gateway sends to devices
    pub output_format: AudioParams,
    /// How long a device may stay silent before it is reclaimed
    pub freshness_window: Duration,
}

/// Device session gateway: handshake processing and control-message routing
pub struct Gateway {
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn Transport>,
    control: Arc<dyn ControlPlane>,
    recognizer: StreamingRecognizer,
    reaper: SessionReaper,
    settings: GatewaySettings,
}

impl Gateway {
    pub fn new(
        reaper: SessionReaper,
        transport: Arc<dyn Transport>,
        control: Arc<dyn ControlPlane>,
        recognizer: StreamingRecognizer,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            registry: Arc::clone(reaper.registry()),
            transport,
            control,
            recognizer,
            reaper,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn reaper(&self) -> &SessionReaper {
        &self.reaper
    }

    /// Handle control-plane messages until the stream ends or `shutdown` fires
    pub async fn serve<S>(self: Arc<Self>, mut inbound: S, shutdown: CancellationToken)
    where
        S: Stream<Item = InboundMessage> + Unpin + Send,
    {
        info!("Gateway accepting control messages");

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = inbound.next() => match message {
                    Some(message) => message,
                    None => {
                        warn!("Control-plane subscription ended");
                        break;
                    }
                },
            };

            self.handle_message(message).await;
        }

        info!("Gateway stopped accepting control messages");
    }

    /// Entry point for one control-plane message; every failure is logged and dropped
    pub async fn handle_message(&self, message: InboundMessage) {
        debug!(
            "Control message on {}: {}",
            message.topic,
            String::from_utf8_lossy(&message.payload)
        );

        let parsed = match ClientMessage::parse(&message.payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Dropping malformed control message on {}: {}", message.topic, e);
                return;
            }
        };

        let result = if parsed.is_hello() {
            self.handle_hello(&message.topic, &parsed).await.map(|_| ())
        } else {
            self.handle_data_message(&message.topic, &message.payload, &parsed)
                .await
        };

        if let Err(e) = result {
            match e {
                GatewayError::UnsupportedTransport(_) | GatewayError::UnknownDevice(_) => {
                    warn!("Dropped {} message on {}: {}", parsed.kind, message.topic, e)
                }
                _ => error!("Failed {} message on {}: {}", parsed.kind, message.topic, e),
            }
        }
    }

    /// Process a hello: allocate a transport session, bind a new handler for
    /// the device (superseding any previous one) and send the reply.
    pub async fn handle_hello(&self, topic: &str, message: &ClientMessage) -> Result<HelloReply> {
        let transport = message.transport.as_deref().unwrap_or_default();
        if transport != TRANSPORT_UDP {
            return Err(GatewayError::UnsupportedTransport(transport.to_string()));
        }

        let address =
            parse_device_address(topic).ok_or_else(|| GatewayError::InvalidTopic(topic.to_string()))?;

        let transport_session = self
            .transport
            .create_session(topic)
            .ok_or_else(|| GatewayError::SessionAllocation(address.device_id.clone()))?;

        let reply_topic = reply_topic(&self.settings.reply_prefix, &address.raw);
        let input_format = message
            .audio_params
            .as_ref()
            .map(|params| params.resolve(&self.settings.input_defaults))
            .unwrap_or_else(|| self.settings.input_defaults.clone());

        let session = DeviceSession::new(
            address.device_id.clone(),
            reply_topic.clone(),
            Arc::clone(&transport_session),
            input_format,
            self.settings.output_format.clone(),
        );
        let handler: Arc<dyn SessionHandler> = Arc::new(DeviceHandler::new(
            session,
            self.settings.freshness_window,
            Arc::clone(&self.control),
            self.recognizer.clone(),
        ));

        transport_session.bind_handler(&handler);

        if let Some(previous) = self
            .registry
            .put(address.device_id.clone(), Arc::clone(&handler))
        {
            self.reaper.retire(&previous).await;
        }

        let endpoint = self.transport.endpoint();
        let reply = HelloReply::udp(
            transport_session.id.clone(),
            UdpEndpoint {
                server: endpoint.host,
                port: endpoint.port,
                key: hex::encode(transport_session.key),
                nonce: hex::encode(composite_nonce(&transport_session.nonce)),
            },
            self.settings.output_format.clone(),
        );

        let published = match serde_json::to_vec(&reply) {
            Ok(payload) => self.control.publish(&reply_topic, payload).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = published {
            // The device never learns its session; it will say hello again
            self.reaper.discard(&address.device_id, &handler);
            return Err(e);
        }

        info!(
            "Handshake complete for device {} (session {}), reply on {}",
            address.device_id, transport_session.id, reply_topic
        );
        self.reaper
            .events()
            .online(&address.device_id, &transport_session.id)
            .await;

        handler.start();

        Ok(reply)
    }

    /// Route a non-hello message to the device's handler.
    ///
    /// Messages for devices without a completed handshake are rejected
    /// without touching the registry.
    pub async fn handle_data_message(
        &self,
        topic: &str,
        payload: &[u8],
        message: &ClientMessage,
    ) -> Result<()> {
        let address =
            parse_device_address(topic).ok_or_else(|| GatewayError::InvalidTopic(topic.to_string()))?;

        let handler = self
            .registry
            .get(&address.device_id)
            .ok_or_else(|| GatewayError::UnknownDevice(address.device_id.clone()))?;

        handler.update_last_active();

        match message.kind.as_str() {
            MESSAGE_TYPE_HELLO => self.handle_hello(topic, message).await.map(|_| ()),
            MESSAGE_TYPE_GOODBYE => {
                self.handle_goodbye(&handler, message).await;
                Ok(())
            }
            _ => {
                handler.dispatch(payload).await;
                Ok(())
            }
        }
    }

    /// End a session at the device's request.
    ///
    /// Only a goodbye naming the currently bound transport session reclaims
    /// it; anything else is ignored.
    pub async fn handle_goodbye(&self, handler: &Arc<dyn SessionHandler>, message: &ClientMessage) -> bool {
        match message.session_id.as_deref() {
            Some(session_id) if session_id == handler.session_id() => {
                info!(
                    "Goodbye from device {} (session {})",
                    handler.device_id(),
                    session_id
                );
                self.reaper.reclaim(handler.device_id(), handler).await
            }
            other => {
                debug!(
                    "Ignoring goodbye from device {} for session {:?} (current {})",
                    handler.device_id(),
                    other,
                    handler.session_id()
                );
                false
            }
        }
    }

    /// Dispatch `payload` to a registered device as if the device had sent it
    pub async fn inject(&self, device_id: &str, payload: &[u8]) -> Result<()> {
        let handler = self
            .registry
            .get(device_id)
            .ok_or_else(|| GatewayError::UnknownDevice(device_id.to_string()))?;

        handler.dispatch(payload).await;
        Ok(())
    }

    /// Reclaim a device session on operator request
    pub async fn disconnect(&self, device_id: &str) -> bool {
        self.reaper.disconnect(device_id).await
    }
}
