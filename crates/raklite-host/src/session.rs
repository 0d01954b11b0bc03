use std::{fmt::Debug, net::SocketAddr, time::Instant};

use raklite_core::config::Config;

use crate::event_types::{Action, SessionEventAddress};

/// Manages the lifecycle and state of one peer session.
/// Defines the `Send` and `Receive` event types used by a session.
pub trait Session: Debug {
    /// User command type routed to sessions.
    type SendEvent: Debug + SessionEventAddress;
    /// Event type surfaced to the user.
    type ReceiveEvent: Debug + SessionEventAddress;

    /// Creates the session for a remote peer admitted by the offline
    /// handshake.
    fn create_incoming(
        config: &Config,
        address: SocketAddr,
        local_address: SocketAddr,
        time: Instant,
    ) -> Self;

    /// Creates a session from a user command targeting an unknown address,
    /// or `None` when the command cannot open a connection.
    fn create_from_command(
        config: &Config,
        event: &Self::SendEvent,
        local_address: SocketAddr,
        time: Instant,
    ) -> Option<Self>
    where
        Self: Sized;

    /// True once the connection handshake has completed.
    fn is_established(&self) -> bool;

    /// Determines if the session should be dropped, with any final events.
    fn should_drop(&mut self, time: Instant) -> (bool, Vec<Action<Self::ReceiveEvent>>);

    /// Processes a received reliability-framed datagram.
    fn process_datagram(&mut self, payload: &[u8], time: Instant)
        -> Vec<Action<Self::ReceiveEvent>>;

    /// Processes one user command routed to this session.
    fn process_event(
        &mut self,
        event: Self::SendEvent,
        time: Instant,
    ) -> Vec<Action<Self::ReceiveEvent>>;

    /// The offline handshake answered: proceed with the connected exchange.
    fn on_offline_reply(&mut self, time: Instant) -> Vec<Action<Self::ReceiveEvent>>;

    /// The offline handshake was refused by a full server.
    fn on_offline_refusal(&mut self, time: Instant) -> Vec<Action<Self::ReceiveEvent>>;

    /// Starts a graceful disconnect.
    fn disconnect(&mut self, time: Instant) -> Vec<Action<Self::ReceiveEvent>>;

    /// Runs session timers: retransmits, keepalives, acknowledgment flushes.
    fn update(&mut self, time: Instant) -> Vec<Action<Self::ReceiveEvent>>;
}
