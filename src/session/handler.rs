/// The pipeline object bound to one live device session.
///
/// Implementations own everything tied to the device's interaction (audio
/// pump, recognition requests, outbound replies). The registry and the
/// supervisor only ever talk to a device through this trait.
#[async_trait::async_trait]
pub trait SessionHandler: Send + Sync {
    /// Canonical device identifier (`AA:BB:...`)
    fn device_id(&self) -> &str;

    /// Identifier of the transport session this handler is bound to
    fn session_id(&self) -> &str;

    /// Whether the device has been heard from within the freshness window
    fn is_active(&self) -> bool;

    /// Record activity from the device
    fn update_last_active(&self);

    /// Begin audio processing; called once, right after the hello reply is sent
    fn start(&self);

    /// Handle a non-handshake control message
    async fn dispatch(&self, payload: &[u8]);

    /// Accept one decoded audio frame from the data plane
    fn push_audio(&self, frame: Vec<u8>) -> bool;

    /// Cancel all in-flight work (recognition requests, timers)
    fn cancel(&self);

    /// Release remaining resources; the handler is unusable afterwards
    fn destroy(&self);
}
