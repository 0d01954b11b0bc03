use std::{default::Default, time::Duration};

use crate::constants::ORDERING_CHANNEL_COUNT;

#[derive(Clone, Debug)]
/// Configuration options to tune protocol and host behavior.
pub struct Config {
    /// Make the underlying UDP socket block when true, otherwise non-blocking.
    pub blocking_mode: bool,
    /// Max idle time without any inbound datagram before a peer is reaped.
    pub idle_connection_timeout: Duration,
    /// Interval of outbound silence after which a reliable InternalPing is
    /// sent. None disables keepalives.
    pub ping_interval: Option<Duration>,
    /// Lower bound for the retransmission timeout.
    pub min_rto: Duration,
    /// Number of unacknowledged retransmissions after which a peer is
    /// considered lost.
    pub max_resends: u32,
    /// Number of ordering channels per peer (the wire allows up to 32).
    pub ordering_channel_count: u8,
    /// Max number of simultaneously connected peers.
    pub max_connections: usize,
    /// Password incoming ConnectionRequests must carry. Empty accepts
    /// passwordless requests.
    pub incoming_password: Vec<u8>,
    /// Max receive buffer size in bytes.
    pub receive_buffer_max_size: usize,
    /// Socket receive buffer size in bytes (None = use system default).
    /// Corresponds to SO_RCVBUF socket option.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = use system default).
    /// Corresponds to SO_SNDBUF socket option.
    pub socket_send_buffer_size: Option<usize>,
    /// Time-to-live for outgoing packets (None = use system default).
    pub socket_ttl: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blocking_mode: false,
            idle_connection_timeout: Duration::from_secs(10),
            ping_interval: Some(Duration::from_secs(5)),
            min_rto: Duration::from_secs(1),
            max_resends: 10,
            ordering_channel_count: ORDERING_CHANNEL_COUNT,
            max_connections: 32,
            incoming_password: Vec::new(),
            receive_buffer_max_size: crate::constants::MTU_SIZE,
            socket_recv_buffer_size: None,
            socket_send_buffer_size: None,
            socket_ttl: None,
        }
    }
}
