//! Offline handshake handling.
//!
//! Datagrams carrying the 16-byte offline message id are exchanged before a
//! peer exists. The handler decides, per datagram, whether to admit a peer,
//! refuse it, or advance a connecting client; malformed offline traffic is
//! dropped silently.

use tracing::debug;

use raklite_protocol::OfflineMessage;

/// Decision taken for one offline datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum OfflineOutcome {
    /// Admit the sender as a new unverified peer and send the reply.
    Admit {
        /// Raw reply datagram.
        reply: Vec<u8>,
    },
    /// Send the reply without admitting the sender.
    Refuse {
        /// Raw reply datagram.
        reply: Vec<u8>,
    },
    /// A server admitted our own connection attempt.
    ClientAdmitted,
    /// A full server turned our connection attempt down.
    ClientRefused,
    /// Not a well-formed offline message; drop it.
    Ignore,
}

/// Recognizes the pre-connection handshake exchange.
#[derive(Debug)]
pub struct OfflineMessageHandler {
    max_connections: usize,
}

impl OfflineMessageHandler {
    /// Creates a handler enforcing the connection limit.
    pub fn new(max_connections: usize) -> Self {
        Self { max_connections }
    }

    /// Classifies one offline datagram.
    ///
    /// `known_peer` tells whether the sender already has a session;
    /// `connection_count` is the current size of the peer table.
    pub fn handle(
        &self,
        datagram: &[u8],
        known_peer: bool,
        connection_count: usize,
    ) -> OfflineOutcome {
        let message = match OfflineMessage::decode(datagram) {
            Ok(message) => message,
            Err(err) => {
                debug!("dropping malformed offline message: {}", err);
                return OfflineOutcome::Ignore;
            }
        };
        match message {
            OfflineMessage::OpenConnectionRequest { .. } => {
                if known_peer || connection_count < self.max_connections {
                    OfflineOutcome::Admit { reply: OfflineMessage::OpenConnectionReply.encode() }
                } else {
                    debug!("connection table full, refusing open connection request");
                    OfflineOutcome::Refuse {
                        reply: OfflineMessage::NoFreeIncomingConnections.encode(),
                    }
                }
            }
            OfflineMessage::OpenConnectionReply => OfflineOutcome::ClientAdmitted,
            OfflineMessage::NoFreeIncomingConnections => OfflineOutcome::ClientRefused,
        }
    }
}
