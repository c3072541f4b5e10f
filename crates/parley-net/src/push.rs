//! Push channel contract.
//!
//! The bidirectional channel is an external collaborator (a websocket or
//! socket.io-style client). A channel instance delivers [`PushEvent`]s into
//! the sender it was constructed with; the connection manager is the only
//! component allowed to create, replace, or close instances.

use tokio::sync::mpsc;

use parley_shared::events::{ClientEvent, PushEvent};

use crate::error::Result;

/// One live push channel instance.
///
/// `open` begins connecting; the outcome arrives asynchronously as a
/// `Connected` or `ConnectError` event on the sender given to the factory.
/// After `close`, the instance must stop delivering events.
pub trait PushChannel: Send {
    fn open(&mut self);

    fn close(&mut self);

    /// Send a client-originated event (typing indicators).
    fn emit(&mut self, event: &ClientEvent) -> Result<()>;
}

/// Builds a fresh channel instance wired to the given event sender.
///
/// Every (re)connect goes through the factory so that no handler state can
/// leak from a previous instance.
pub type PushChannelFactory =
    Box<dyn FnMut(mpsc::Sender<PushEvent>) -> Box<dyn PushChannel> + Send>;
