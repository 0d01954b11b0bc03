//! Datagram interception for custom processing.
//!
//! Interceptors see raw datagrams right at the socket boundary and may
//! inspect, modify, or drop them. The integration tests use them as a link
//! conditioner (loss, reordering); applications can use them for packet
//! capture or analytics.

use std::net::SocketAddr;

/// Trait for intercepting datagrams before/after protocol processing.
pub trait Interceptor: Send {
    /// Called for every datagram received from the network, before protocol
    /// processing. Returning `false` drops the datagram.
    fn on_receive(&mut self, addr: &SocketAddr, data: &mut [u8]) -> bool;

    /// Called for every datagram about to be sent, after protocol encoding.
    /// Returning `false` drops the datagram.
    fn on_send(&mut self, addr: &SocketAddr, data: &mut Vec<u8>) -> bool;
}

/// No-op interceptor that passes all datagrams through unchanged.
///
/// This is the default interceptor when none is specified.
#[derive(Debug, Clone, Copy)]
pub struct NoOpInterceptor;

impl Interceptor for NoOpInterceptor {
    fn on_receive(&mut self, _addr: &SocketAddr, _data: &mut [u8]) -> bool {
        true
    }

    fn on_send(&mut self, _addr: &SocketAddr, _data: &mut Vec<u8>) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    struct DroppingInterceptor;

    impl Interceptor for DroppingInterceptor {
        fn on_receive(&mut self, _addr: &SocketAddr, _data: &mut [u8]) -> bool {
            false
        }

        fn on_send(&mut self, _addr: &SocketAddr, _data: &mut Vec<u8>) -> bool {
            false
        }
    }

    #[test]
    fn noop_passes_through() {
        let mut interceptor = NoOpInterceptor;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

        let mut data = vec![1, 2, 3];
        let original = data.clone();

        assert!(interceptor.on_receive(&addr, &mut data));
        assert!(interceptor.on_send(&addr, &mut data));
        assert_eq!(data, original);
    }

    #[test]
    fn dropping_refuses_both_directions() {
        let mut interceptor = DroppingInterceptor;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

        let mut data = vec![1, 2, 3];
        assert!(!interceptor.on_receive(&addr, &mut data));
        assert!(!interceptor.on_send(&addr, &mut data));
    }
}
