//! Device session gateway
//!
//! `Gateway` processes control-plane messages: it performs the hello
//! handshake, binds a `DeviceHandler` per device, and routes every later
//! message to that handler.

mod handler;
mod server;

pub use handler::DeviceHandler;
pub use server::{Gateway, GatewaySettings};
