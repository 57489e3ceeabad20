//! HTTP admin API
//!
//! - GET /health - Health check
//! - GET /devices - Registered device sessions
//! - POST /devices/:id/inject - Dispatch a control message to a device
//! - DELETE /devices/:id - Reclaim a device session

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
