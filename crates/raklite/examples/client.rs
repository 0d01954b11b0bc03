//! Interactive-ish client using raklite: connects, sends a few messages,
//! prints what comes back.
//!
//! Run:
//! - cargo run -p raklite --example client
//! - cargo run -p raklite --example client -- 127.0.0.1:1001

use std::{
    env,
    thread,
    time::{Duration, Instant},
};

use raklite::{Host, MessageId, Reliability, SocketEvent};
use raklite_utilities::resolve_host;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr = match env::args().nth(1) {
        Some(addr) => raklite_utilities::parse_addr(&addr)?,
        None => resolve_host("localhost", 1001)?,
    };

    let mut host = Host::bind_any()?;
    println!("client bound to {}", host.local_addr()?);
    host.connect(server_addr, Vec::new())?;

    let mut sent = 0u32;
    let start = Instant::now();
    loop {
        host.manual_poll(Instant::now());

        while let Some(event) = host.recv() {
            match event {
                SocketEvent::Connected(addr) => {
                    println!("[connected] {}", addr);
                    // first user opcode, then the message body
                    let mut payload = vec![MessageId::UserMessage as u8];
                    payload.extend_from_slice(b"hello from raklite");
                    host.send(addr, payload, Reliability::ReliableOrdered, 0)?;
                    sent += 1;
                }
                SocketEvent::Packet { address, payload } => {
                    println!(
                        "[echo] from={} \"{}\"",
                        address,
                        String::from_utf8_lossy(&payload[1..])
                    );
                    if sent < 3 {
                        let mut next = vec![MessageId::UserMessage as u8];
                        next.extend_from_slice(format!("message #{}", sent + 1).as_bytes());
                        host.send(address, next, Reliability::ReliableOrdered, 0)?;
                        sent += 1;
                    } else {
                        host.disconnect(address)?;
                    }
                }
                SocketEvent::Disconnected(addr, reason) => {
                    println!("[disconnected] {} ({:?})", addr, reason);
                    return Ok(());
                }
            }
        }

        if start.elapsed() > Duration::from_secs(30) {
            eprintln!("giving up after 30s");
            host.shutdown();
            return Ok(());
        }
        thread::sleep(Duration::from_millis(10));
    }
}
