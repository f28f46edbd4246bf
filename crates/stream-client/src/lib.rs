//! Streaming Client
//!
//! Keeps exactly one outbound connection to the collector and sends one
//! frame per connection:
//! - Connect, send on confirmation, tear down, reconnect immediately
//! - Transport resets force the client back to idle
//! - A watchdog aborts attempts that stall across ten transmit triggers

mod client;
mod error;
mod mock;
mod state;
mod tcp;
mod transport;

pub use client::{StreamingClient, TransmitOutcome, WATCHDOG_LIMIT};
pub use error::TransportError;
pub use mock::MockTransport;
pub use state::ConnectionState;
pub use tcp::{TcpConfig, TcpTransport};
pub use transport::{Transport, TransportEvent};
