//! Topic addressing
//!
//! Devices publish on a 4-segment path such as `/p2p/device_public/AA_BB_CC_DD_EE_FF`.
//! The last segment is the hardware address with `_` separators; the device
//! identifier is the same address in colon form. NATS subjects carry the
//! same path with `.` separators, so the broker edge converts between them.

const TOPIC_SEGMENTS: usize = 4;

/// Device address parsed out of a control-plane topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    /// Address exactly as it appears in the topic (`AA_BB_...`)
    pub raw: String,
    /// Canonical identifier (`AA:BB:...`)
    pub device_id: String,
}

/// Extract the device address from a 4-segment topic path
pub fn parse_device_address(topic: &str) -> Option<DeviceAddress> {
    let segments: Vec<&str> = topic.split('/').collect();
    if segments.len() != TOPIC_SEGMENTS {
        return None;
    }

    let raw = segments[TOPIC_SEGMENTS - 1];
    if raw.is_empty() {
        return None;
    }

    Some(DeviceAddress {
        raw: raw.to_string(),
        device_id: raw.replace('_', ":"),
    })
}

/// Destination the gateway publishes replies to for one device
pub fn reply_topic(prefix: &str, raw_address: &str) -> String {
    format!("{}{}", prefix, raw_address)
}

/// `p2p.device_public.AA_BB` -> `/p2p/device_public/AA_BB`
pub fn subject_to_topic(subject: &str) -> String {
    format!("/{}", subject.replace('.', "/"))
}

/// `/p2p/device_public/AA_BB` or `devices/p2p/AA_BB` -> dotted subject
pub fn topic_to_subject(topic: &str) -> String {
    topic.trim_start_matches('/').replace('/', ".")
}
