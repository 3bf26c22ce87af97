pub mod bus;
pub mod connection;

pub use bus::{BroadcastBus, ConnectionHandle, ConnectionId, InMemoryBus, SharedBus};
pub use connection::{Gateway, Identity, Session};
