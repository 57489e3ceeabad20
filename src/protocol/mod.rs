//! Device control-plane protocol
//!
//! Wire types exchanged with devices over the pub/sub control plane, the
//! composite nonce issued at handshake time, and the topic addressing
//! convention that maps a device's hardware address to its identifier.

pub mod messages;
pub mod nonce;
pub mod topic;

pub use messages::{
    AudioParams, ClientMessage, DeviceEvent, HelloReply, RequestedAudioParams, SttMessage,
    UdpEndpoint,
};
pub use nonce::composite_nonce;
pub use topic::{parse_device_address, reply_topic, subject_to_topic, topic_to_subject, DeviceAddress};
