// Network layer: request/response transport, push channel contract, and the
// connection state machine with bounded exponential backoff.

pub mod connection;
pub mod error;
pub mod push;
pub mod transport;

pub use connection::{backoff_delay, ConnectionManager, ConnectionSignal, ReconnectConfig};
pub use error::{NetError, Result};
pub use push::{PushChannel, PushChannelFactory};
pub use transport::{HttpTransport, Transport};
