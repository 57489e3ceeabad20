/// Length of the composite nonce handed to devices
pub const COMPOSITE_NONCE_LEN: usize = 16;

/// Format-version prefix; the reserved length field that follows is always zero
const VERSION_PREFIX: [u8; 2] = [0x01, 0x00];
const RESERVED_LENGTH: [u8; 2] = [0x00, 0x00];

/// Build the composite nonce for a freshly allocated transport session.
///
/// Layout: 2-byte version prefix, 2-byte reserved length, 8-byte random
/// session nonce, 4-byte packet sequence. The sequence is always zero here;
/// the transport advances it per encrypted packet.
pub fn composite_nonce(seed: &[u8; 8]) -> [u8; COMPOSITE_NONCE_LEN] {
    let mut nonce = [0u8; COMPOSITE_NONCE_LEN];
    nonce[..2].copy_from_slice(&VERSION_PREFIX);
    nonce[2..4].copy_from_slice(&RESERVED_LENGTH);
    nonce[4..12].copy_from_slice(seed);
    nonce
}
