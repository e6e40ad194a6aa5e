//! Live price feed
//!
//! Features:
//! - WebSocket connection to a price stream with automatic reconnection
//! - Per-entry frame decoding (one bad price never drops a frame)
//! - Copy-on-write price store with sparse merges and change notification
//! - Pluggable transport for driving the connection without a network

pub mod connection;
pub mod decoder;
pub mod state;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use connection::{
    Action, ConnectionConfig, ConnectionHandle, ConnectionManager, ConnectionStats, Phase,
    ReconnectMachine,
};
pub use decoder::{decode_frame, FrameTicks};
pub use state::{PriceStore, PriceStoreStats};
pub use transport::{Socket, SocketEvent, Transport, WsTransport};
