//! Real-time relay: admission, per-connection pumps and the hub they
//! register with.

pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod handler;
pub mod presence;
pub mod pump;
pub mod registry;
pub mod server;

pub use connection::{Connection, ConnectionId, Registration};
pub use dispatcher::{DeliveryPolicy, Dispatcher, HubHandle};
pub use events::{ClientEvent, ServerEvent};
