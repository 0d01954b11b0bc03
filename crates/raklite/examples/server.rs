//! Simple echo server using raklite.
//!
//! Run:
//! - cargo run -p raklite --example server
//! - cargo run -p raklite --example server -- 127.0.0.1:1001

use std::{
    env,
    net::SocketAddr,
    thread,
    time::{Duration, Instant},
};

use raklite::{Config, Host, Reliability, SocketEvent};

fn parse_bind_addr() -> Option<SocketAddr> {
    let mut args = env::args().skip(1);
    args.next().and_then(|s| raklite_utilities::parse_addr(&s).ok())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Basic config; tweak here to demo features quickly
    let config = Config::default();
    // Uncomment to require a password:
    // config.incoming_password = b"hunter2".to_vec();

    let bind_addr = parse_bind_addr().unwrap_or_else(|| "127.0.0.1:1001".parse().unwrap());
    let mut host = Host::bind_with_config(bind_addr, config)?;
    let local = host.local_addr()?;
    println!("raklite echo server listening on {}", local);
    println!("Connect with the client example to see echoes.");

    loop {
        host.manual_poll(Instant::now());

        while let Some(event) = host.recv() {
            match event {
                SocketEvent::Connected(addr) => {
                    println!("[connect] {}", addr);
                }
                SocketEvent::Packet { address, payload } => {
                    let text = String::from_utf8_lossy(&payload[1..]);
                    println!("[packet] from={} opcode={:#04x} payload=\"{}\"", address, payload[0], text);

                    // Echo back on the same channel, reliable-ordered
                    if let Err(e) = host.send(address, payload, Reliability::ReliableOrdered, 0) {
                        eprintln!("failed to queue echo: {}", e);
                    }
                }
                SocketEvent::Disconnected(addr, reason) => {
                    println!("[disconnect] {} ({:?})", addr, reason);
                }
            }
        }

        thread::sleep(Duration::from_millis(10));
    }
}
