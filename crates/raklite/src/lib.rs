#![warn(missing_docs)]

//! Raklite: a small public API facade for the workspace.
//!
//! This crate provides a clean, stable surface that re-exports the most
//! commonly used types to build RakNet 3.25 compatible UDP apps:
//!
//! - Host and events (`Host`, `SocketEvent`, `DisconnectReason`)
//! - Reliability classes (`Reliability`)
//! - Message identifiers and the bit-level stream (`MessageId`, `BitStream`)
//! - Core configuration (`Config`)
//!
//! Example
//! ```no_run
//! use raklite::{Host, Reliability, SocketEvent};
//! use std::time::Instant;
//!
//! let mut server = Host::bind("127.0.0.1:1001").unwrap();
//! loop {
//!     server.manual_poll(Instant::now());
//!     while let Some(event) = server.recv() {
//!         match event {
//!             SocketEvent::Connected(addr) => println!("{} connected", addr),
//!             SocketEvent::Packet { address, payload } => {
//!                 // echo back, reliable-ordered on channel 0
//!                 server.send(address, payload, Reliability::ReliableOrdered, 0).unwrap();
//!             }
//!             SocketEvent::Disconnected(addr, reason) => {
//!                 println!("{} gone: {:?}", addr, reason);
//!             }
//!         }
//!     }
//! }
//! ```

// Core config and errors
pub use raklite_core::config::Config;
pub use raklite_core::error::{BitStreamError, DecodingErrorKind, ErrorKind, Result};
// Host: manages multiple peer sessions and events
pub use raklite_host::{Command, DisconnectReason, Host, SocketEvent};
// Protocol: framing vocabulary
pub use raklite_protocol::{BitStream, MessageId, Reliability};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        BitStream, Config, DisconnectReason, ErrorKind, Host, MessageId, Reliability, SocketEvent,
    };
}
