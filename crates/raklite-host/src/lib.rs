#![warn(missing_docs)]

//! raklite-host: socket handling, session management, and the public API.
//!
//! The [`Host`] owns a non-blocking UDP socket and a table of peers keyed by
//! remote address. A single-threaded cooperative loop drives everything:
//! each [`Host::manual_poll`] drains the socket, dispatches datagrams to the
//! offline handshake handler or the owning peer, runs user commands that
//! were marshaled onto the loop over a channel, ticks every peer's timers,
//! and reaps dead peers. No peer state is ever touched from another thread.

/// Event and action types for the host layer.
pub mod event_types;
/// Offline handshake handling.
pub mod offline;
/// The Session implementation for RakNet peers.
pub mod peer_session;
/// Session lifecycle trait consumed by the session manager.
pub mod session;
/// Peer table and the poll loop.
pub mod session_manager;
/// The UDP host façade.
pub mod socket;
/// Clock abstraction for testable time.
pub mod time;

pub use event_types::{Command, SocketEvent};
pub use raklite_peer::DisconnectReason;
pub use socket::Host;
