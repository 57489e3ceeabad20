//! Device session management
//!
//! This module provides:
//! - `DeviceSession`: per-device state negotiated at handshake time
//! - `SessionHandler`: the object bound to one live device session
//! - `SessionRegistry`: concurrent device identifier → handler map
//! - `SessionReaper`: the single teardown path for a device session
//! - `LivenessSupervisor`: periodic sweep that reclaims silent devices
//! - `DeviceEvents`: online/offline notifications on the control plane

mod device;
mod events;
mod handler;
mod reaper;
mod registry;
mod supervisor;

pub use device::DeviceSession;
pub use events::DeviceEvents;
pub use handler::SessionHandler;
pub use reaper::SessionReaper;
pub use registry::SessionRegistry;
pub use supervisor::{LivenessSupervisor, DEFAULT_SWEEP_INTERVAL};
