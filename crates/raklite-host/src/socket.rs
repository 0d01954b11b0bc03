use std::{
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket},
    sync::Arc,
    thread::{sleep, yield_now},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use raklite_core::{
    config::Config,
    constants::max_user_payload,
    error::{ErrorKind, Result},
    interceptor::Interceptor,
    transport::DatagramSocket,
};
use raklite_peer::RakPeer;
use raklite_protocol::Reliability;
use socket2::Socket as Socket2;

use crate::{
    event_types::{Command, SocketEvent},
    session_manager::SessionManager,
    time::{Clock, SystemClock},
};

/// Applies socket options from configuration to a UdpSocket.
fn apply_socket_options(socket: &UdpSocket, config: &Config) -> io::Result<()> {
    let socket2 = Socket2::from(socket.try_clone()?);

    if let Some(size) = config.socket_recv_buffer_size {
        socket2.set_recv_buffer_size(size)?;
    }
    if let Some(size) = config.socket_send_buffer_size {
        socket2.set_send_buffer_size(size)?;
    }
    if let Some(ttl) = config.socket_ttl {
        socket.set_ttl(ttl)?;
    }

    Ok(())
}

fn map_bind_error(err: io::Error) -> ErrorKind {
    if err.kind() == io::ErrorKind::AddrInUse {
        ErrorKind::AddressInUse(err)
    } else {
        ErrorKind::Io(err)
    }
}

#[derive(Debug)]
struct BoundSocket {
    is_blocking_mode: bool,
    socket: UdpSocket,
}

impl BoundSocket {
    fn new(socket: UdpSocket, is_blocking_mode: bool) -> Result<Self> {
        socket.set_nonblocking(!is_blocking_mode)?;
        Ok(BoundSocket { is_blocking_mode, socket })
    }
}

impl DatagramSocket for BoundSocket {
    fn send_datagram(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, addr)
    }

    fn receive_datagram<'a>(
        &mut self,
        buffer: &'a mut [u8],
    ) -> io::Result<(&'a [u8], SocketAddr)> {
        self.socket.recv_from(buffer).map(move |(recv_len, address)| (&buffer[..recv_len], address))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn is_blocking_mode(&self) -> bool {
        self.is_blocking_mode
    }
}

/// High-level endpoint managing multiple peers over a single UDP socket.
///
/// All peer state lives behind [`Host::manual_poll`]; `send`, `connect`, and
/// `disconnect` marshal their work onto the loop over a channel, so they are
/// safe to call from other threads through a cloned command sender.
pub struct Host {
    manager: SessionManager<BoundSocket, RakPeer>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").field("manager", &self.manager).finish()
    }
}

impl Host {
    /// Creates a new Host bound to the specified address with default
    /// configuration.
    pub fn bind<A: ToSocketAddrs>(addresses: A) -> Result<Self> {
        Self::bind_with_config(addresses, Config::default())
    }

    /// Creates a new Host bound to any available port on localhost.
    pub fn bind_any() -> Result<Self> {
        Self::bind_any_with_config(Config::default())
    }

    /// Creates a new Host bound to any available port on localhost with the
    /// specified configuration.
    pub fn bind_any_with_config(config: Config) -> Result<Self> {
        let loopback = Ipv4Addr::new(127, 0, 0, 1);
        let address = SocketAddrV4::new(loopback, 0);
        let socket = UdpSocket::bind(address).map_err(map_bind_error)?;
        Self::bind_with_config_and_clock(socket, config, Arc::new(SystemClock))
    }

    /// Creates a new Host bound to the specified address with custom
    /// configuration.
    pub fn bind_with_config<A: ToSocketAddrs>(addresses: A, config: Config) -> Result<Self> {
        let socket = UdpSocket::bind(addresses).map_err(map_bind_error)?;
        Self::bind_with_config_and_clock(socket, config, Arc::new(SystemClock))
    }

    /// Creates a new Host with a custom socket and clock for testing.
    pub fn bind_with_config_and_clock(
        socket: UdpSocket,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::bind_with_config_clock_and_interceptor(socket, config, clock, None)
    }

    /// Creates a new Host with custom socket, configuration, clock, and
    /// interceptor.
    pub fn bind_with_config_clock_and_interceptor(
        socket: UdpSocket,
        config: Config,
        clock: Arc<dyn Clock>,
        interceptor: Option<Box<dyn Interceptor>>,
    ) -> Result<Self> {
        apply_socket_options(&socket, &config)?;
        let blocking = config.blocking_mode;
        Ok(Host {
            manager: SessionManager::new_with_interceptor(
                BoundSocket::new(socket, blocking)?,
                config,
                interceptor,
            )?,
            clock,
        })
    }

    /// Creates a Host with a custom interceptor for datagram inspection,
    /// modification, or loss injection.
    pub fn bind_with_interceptor<A: ToSocketAddrs>(
        addresses: A,
        config: Config,
        interceptor: Box<dyn Interceptor>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addresses).map_err(map_bind_error)?;
        Self::bind_with_config_clock_and_interceptor(
            socket,
            config,
            Arc::new(SystemClock),
            Some(interceptor),
        )
    }

    /// Returns a clone of the command sender for use from other threads.
    pub fn get_command_sender(&self) -> Sender<Command> {
        self.manager.command_sender().clone()
    }

    /// Returns a clone of the event receiver channel.
    pub fn get_event_receiver(&self) -> Receiver<SocketEvent> {
        self.manager.event_receiver().clone()
    }

    /// Starts the offline handshake towards a server. The outcome arrives
    /// as a [`SocketEvent::Connected`] or [`SocketEvent::Disconnected`].
    pub fn connect(&mut self, address: SocketAddr, password: Vec<u8>) -> Result<()> {
        self.manager
            .command_sender()
            .send(Command::Connect { address, password })
            .expect("Receiver must exist");
        Ok(())
    }

    /// Enqueues one message to a connected peer. The payload is validated
    /// synchronously; queuing and transmission happen on the next poll.
    pub fn send(
        &mut self,
        address: SocketAddr,
        payload: Vec<u8>,
        reliability: Reliability,
        channel: u8,
    ) -> Result<()> {
        if reliability == Reliability::ReliableSequenced {
            return Err(ErrorKind::NotSupported("sequenced reliable delivery"));
        }
        if channel >= self.manager.config().ordering_channel_count {
            return Err(ErrorKind::InvalidOrderingChannel(channel));
        }
        if payload.len() > max_user_payload() {
            return Err(ErrorKind::PayloadTooLarge { size: payload.len(), max: max_user_payload() });
        }
        self.manager
            .command_sender()
            .send(Command::Send { address, payload, reliability, channel })
            .expect("Receiver must exist");
        Ok(())
    }

    /// Sends the same payload to every established connection. Returns the
    /// number of peers addressed.
    pub fn broadcast(
        &mut self,
        payload: Vec<u8>,
        reliability: Reliability,
        channel: u8,
    ) -> Result<usize> {
        let addresses: Vec<SocketAddr> = self.manager.established_sessions().copied().collect();
        for address in &addresses {
            self.send(*address, payload.clone(), reliability, channel)?;
        }
        Ok(addresses.len())
    }

    /// Receives the next available event, if any.
    pub fn recv(&mut self) -> Option<SocketEvent> {
        match self.manager.event_receiver().try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!("This can never happen"),
        }
    }

    /// Initiates a graceful disconnect from the specified peer.
    pub fn disconnect(&mut self, address: SocketAddr) -> Result<()> {
        self.manager
            .command_sender()
            .send(Command::Disconnect { address })
            .expect("Receiver must exist");
        Ok(())
    }

    /// Notifies every peer best-effort and drops the whole peer table.
    pub fn shutdown(&mut self) {
        self.manager.shutdown(self.clock.now());
    }

    /// Starts automatic polling in a loop with 1 ms intervals (blocking).
    pub fn start_polling(&mut self) {
        self.start_polling_with_duration(Some(Duration::from_millis(1)))
    }

    /// Starts automatic polling with a custom sleep between polls (blocking).
    pub fn start_polling_with_duration(&mut self, sleep_duration: Option<Duration>) {
        loop {
            self.manual_poll(self.clock.now());
            match sleep_duration {
                None => yield_now(),
                Some(duration) => sleep(duration),
            };
        }
    }

    /// Runs one iteration of the loop: drain the socket, dispatch, run
    /// timers, reap, flush.
    pub fn manual_poll(&mut self, time: Instant) {
        self.manager.manual_poll(time);
    }

    /// Returns the local socket address this host is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.manager.socket().local_addr()?)
    }

    /// Returns the number of fully connected peers.
    pub fn connection_count(&self) -> usize {
        self.manager.established_sessions_count()
    }
}
