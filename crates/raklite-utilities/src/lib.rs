//! Utility functions for raklite networking.
//!
//! This crate provides optional convenience utilities for working with
//! raklite:
//!
//! ## Address Utilities
//! Address utilities for DNS and IP operations:
//! - DNS resolution (hostname to IP)
//! - IP string parsing and formatting
//!
//! These utilities are provided as a separate crate to keep the core
//! library dependency-free.

use std::{
    io,
    net::{SocketAddr, ToSocketAddrs},
};

/// Resolves a hostname to a socket address using DNS.
///
/// # Arguments
/// * `hostname` - The hostname to resolve (e.g., "example.com")
/// * `port` - The port number to use
///
/// # Returns
/// The first resolved socket address, or an error if resolution fails.
///
/// # Examples
/// ```no_run
/// use raklite_utilities::resolve_host;
///
/// let addr = resolve_host("localhost", 8080).unwrap();
/// assert_eq!(addr.port(), 8080);
/// ```
pub fn resolve_host(hostname: &str, port: u16) -> io::Result<SocketAddr> {
    let addr_str = format!("{}:{}", hostname, port);
    addr_str
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Could not resolve hostname"))
}

/// Parses an IP:port string into a socket address.
///
/// # Examples
/// ```
/// use raklite_utilities::parse_addr;
///
/// let addr = parse_addr("127.0.0.1:1001").unwrap();
/// assert_eq!(addr.port(), 1001);
/// ```
pub fn parse_addr(address: &str) -> io::Result<SocketAddr> {
    address
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid socket address"))
}

/// Formats a socket address as an `ip:port` string.
pub fn format_addr(address: &SocketAddr) -> String {
    format!("{}:{}", address.ip(), address.port())
}
