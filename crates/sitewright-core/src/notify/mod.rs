//! Real-time context notifications
//!
//! - `hub`: per-project listener sets and best-effort fan-out
//! - `connection`: channel-backed listeners for live transports

pub mod connection;
pub mod hub;

pub use connection::{ChannelListener, Connection};
pub use hub::{BroadcastReport, DeliveryError, FnListener, Listener, NotificationHub, Subscription};
