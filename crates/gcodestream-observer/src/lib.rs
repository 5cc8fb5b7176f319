//! gcodestream observer server
//!
//! Observers connect over WebSocket, receive every engine event as JSON and
//! send control messages back.

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use error::{ObserverError, ObserverResult};
pub use protocol::{ControlMessage, ObserverMessage, DEFAULT_JOG_DISTANCE};
pub use registry::{ObserverId, ObserverRegistry, Outbox};
pub use server::{pump_events, ObserverServer};
pub use session::SessionContext;
