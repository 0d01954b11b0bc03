use std::{collections::HashMap, fmt::Debug, net::SocketAddr, time::Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use raklite_core::{
    config::Config,
    error::ErrorKind,
    interceptor::{Interceptor, NoOpInterceptor},
    transport::DatagramSocket,
};
use raklite_protocol::OfflineMessage;
use tracing::{debug, error, trace};

use crate::{
    event_types::{Action, SessionEventAddress},
    offline::{OfflineMessageHandler, OfflineOutcome},
    session::Session,
};

/// Minimal event sink abstraction to decouple from a concrete channel.
trait EventSink<E> {
    fn send(&mut self, event: E);
}

/// Channel-backed event sink using crossbeam `Sender`.
#[derive(Debug)]
struct ChannelSink<E>(Sender<E>);

impl<E> ChannelSink<E> {
    fn new(sender: Sender<E>) -> Self {
        Self(sender)
    }
}

impl<E> EventSink<E> for ChannelSink<E> {
    fn send(&mut self, event: E) {
        self.0.send(event).expect("Receiver must exist");
    }
}

struct SocketEventSenderAndConfig<TSocket: DatagramSocket, ReceiveEvent: Debug> {
    config: Config,
    socket: TSocket,
    event_sender: ChannelSink<ReceiveEvent>,
    pending_sends: Vec<(SocketAddr, Vec<u8>)>,
    pending_events: Vec<ReceiveEvent>,
    interceptor: Box<dyn Interceptor>,
}

impl<TSocket: DatagramSocket, ReceiveEvent: Debug> Debug
    for SocketEventSenderAndConfig<TSocket, ReceiveEvent>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketEventSenderAndConfig")
            .field("config", &self.config)
            .field("socket", &"<socket>")
            .field("pending_sends", &self.pending_sends)
            .field("pending_events", &self.pending_events)
            .field("interceptor", &"<interceptor>")
            .finish()
    }
}

impl<TSocket: DatagramSocket, ReceiveEvent: Debug>
    SocketEventSenderAndConfig<TSocket, ReceiveEvent>
{
    fn new(
        config: Config,
        socket: TSocket,
        event_sender: Sender<ReceiveEvent>,
        interceptor: Box<dyn Interceptor>,
    ) -> Self {
        Self {
            config,
            socket,
            event_sender: ChannelSink::new(event_sender),
            pending_sends: Vec::new(),
            pending_events: Vec::new(),
            interceptor,
        }
    }

    fn handle_actions(&mut self, address: &SocketAddr, actions: Vec<Action<ReceiveEvent>>) {
        for action in actions {
            match action {
                Action::Send(bytes) => self.pending_sends.push((*address, bytes)),
                Action::Emit(event) => self.pending_events.push(event),
            }
        }
    }

    fn flush(&mut self) {
        for (addr, mut payload) in self.pending_sends.drain(..) {
            if !self.interceptor.on_send(&addr, &mut payload) {
                // interceptor dropped the datagram
                continue;
            }
            if let Err(err) = self.socket.send_datagram(&addr, &payload) {
                error!("error occurred sending a datagram (to {}): {}", addr, err);
            }
        }
        for event in self.pending_events.drain(..) {
            self.event_sender.send(event);
        }
    }
}

/// Session manager over a datagram socket and generic [`Session`] engine.
///
/// Owns the peer table keyed by remote address; every mutation happens
/// inside [`SessionManager::manual_poll`] on the caller's thread.
#[derive(Debug)]
pub struct SessionManager<TSocket: DatagramSocket, TSession: Session> {
    sessions: HashMap<SocketAddr, TSession>,
    receive_buffer: Vec<u8>,
    local_address: SocketAddr,
    offline: OfflineMessageHandler,
    messenger: SocketEventSenderAndConfig<TSocket, TSession::ReceiveEvent>,
    command_receiver: Receiver<TSession::SendEvent>,
    command_sender: Sender<TSession::SendEvent>,
    event_receiver: Receiver<TSession::ReceiveEvent>,
}

impl<TSocket: DatagramSocket, TSession: Session> SessionManager<TSocket, TSession> {
    /// Creates a new session manager over a bound socket.
    pub fn new(socket: TSocket, config: Config) -> Result<Self, ErrorKind> {
        Self::new_with_interceptor(socket, config, None)
    }

    /// Creates a new session manager with a custom interceptor.
    pub fn new_with_interceptor(
        socket: TSocket,
        config: Config,
        interceptor: Option<Box<dyn Interceptor>>,
    ) -> Result<Self, ErrorKind> {
        let (event_sender, event_receiver) = unbounded();
        let (command_sender, command_receiver) = unbounded();
        let local_address = socket.local_addr()?;
        let interceptor = interceptor.unwrap_or_else(|| Box::new(NoOpInterceptor));

        Ok(SessionManager {
            receive_buffer: vec![0; config.receive_buffer_max_size],
            sessions: Default::default(),
            local_address,
            offline: OfflineMessageHandler::new(config.max_connections),
            messenger: SocketEventSenderAndConfig::new(config, socket, event_sender, interceptor),
            command_receiver,
            command_sender,
            event_receiver,
        })
    }

    /// Polls for network I/O, runs user commands, and updates all sessions.
    pub fn manual_poll(&mut self, time: Instant) {
        // drain the socket readable queue
        loop {
            match self.messenger.socket.receive_datagram(self.receive_buffer.as_mut()) {
                Ok((payload, address)) => {
                    let payload_len = payload.len();
                    let should_process = {
                        let buf_slice = &mut self.receive_buffer[..payload_len];
                        self.messenger.interceptor.on_receive(&address, buf_slice)
                    };
                    if !should_process {
                        continue;
                    }
                    let payload = &self.receive_buffer[..payload_len];

                    if OfflineMessage::is_offline_datagram(payload) {
                        let outcome = self.offline.handle(
                            payload,
                            self.sessions.contains_key(&address),
                            self.sessions.len(),
                        );
                        match outcome {
                            OfflineOutcome::Admit { reply } => {
                                self.sessions.entry(address).or_insert_with(|| {
                                    debug!(remote = %address, "admitting new peer");
                                    TSession::create_incoming(
                                        &self.messenger.config,
                                        address,
                                        self.local_address,
                                        time,
                                    )
                                });
                                self.messenger.pending_sends.push((address, reply));
                            }
                            OfflineOutcome::Refuse { reply } => {
                                self.messenger.pending_sends.push((address, reply));
                            }
                            OfflineOutcome::ClientAdmitted => {
                                if let Some(session) = self.sessions.get_mut(&address) {
                                    let actions = session.on_offline_reply(time);
                                    self.messenger.handle_actions(&address, actions);
                                }
                            }
                            OfflineOutcome::ClientRefused => {
                                if let Some(session) = self.sessions.get_mut(&address) {
                                    let actions = session.on_offline_refusal(time);
                                    self.messenger.handle_actions(&address, actions);
                                }
                            }
                            OfflineOutcome::Ignore => {}
                        }
                    } else if let Some(session) = self.sessions.get_mut(&address) {
                        let actions = session.process_datagram(payload, time);
                        self.messenger.handle_actions(&address, actions);
                    } else {
                        trace!(remote = %address, "dropping datagram from unknown address");
                    }
                }
                Err(err) => {
                    if err.kind() != std::io::ErrorKind::WouldBlock {
                        error!("encountered an error receiving data: {:?}", err);
                    }
                    break;
                }
            }
            if self.messenger.socket.is_blocking_mode() {
                break;
            }
        }

        // run user commands marshaled onto this loop
        while let Ok(event) = self.command_receiver.try_recv() {
            let address = event.address();
            use std::collections::hash_map::Entry;
            match self.sessions.entry(address) {
                Entry::Occupied(mut entry) => {
                    let actions = entry.get_mut().process_event(event, time);
                    self.messenger.handle_actions(&address, actions);
                }
                Entry::Vacant(entry) => {
                    match TSession::create_from_command(
                        &self.messenger.config,
                        &event,
                        self.local_address,
                        time,
                    ) {
                        Some(session) => {
                            let session = entry.insert(session);
                            let actions = session.process_event(event, time);
                            self.messenger.handle_actions(&address, actions);
                        }
                        None => {
                            trace!(remote = %address, "dropping command for unknown peer");
                        }
                    }
                }
            }
        }

        // session timers: resends, keepalives, acknowledgment flushes
        for (address, session) in self.sessions.iter_mut() {
            let actions = session.update(time);
            self.messenger.handle_actions(address, actions);
        }

        // reap dead sessions
        let mut to_drop = Vec::new();
        for (address, session) in self.sessions.iter_mut() {
            let (drop_session, actions) = session.should_drop(time);
            self.messenger.handle_actions(address, actions);
            if drop_session {
                to_drop.push(*address);
            }
        }
        for address in to_drop {
            debug!(remote = %address, "removing peer");
            self.sessions.remove(&address);
        }

        self.messenger.flush();
    }

    /// Disconnects every peer best-effort and empties the table.
    pub fn shutdown(&mut self, time: Instant) {
        for (address, session) in self.sessions.iter_mut() {
            let actions = session.disconnect(time);
            self.messenger.handle_actions(address, actions);
        }
        // one final pass flushes the notifications
        for (address, session) in self.sessions.iter_mut() {
            let actions = session.update(time);
            self.messenger.handle_actions(address, actions);
        }
        self.sessions.clear();
        self.messenger.flush();
    }

    /// Returns the sender for marshaling user commands onto the loop.
    pub fn command_sender(&self) -> &Sender<TSession::SendEvent> {
        &self.command_sender
    }

    /// Returns the receiver for session events.
    pub fn event_receiver(&self) -> &Receiver<TSession::ReceiveEvent> {
        &self.event_receiver
    }

    /// Returns a reference to the underlying socket.
    pub fn socket(&self) -> &TSocket {
        &self.messenger.socket
    }

    /// Returns the configuration this manager runs with.
    pub fn config(&self) -> &Config {
        &self.messenger.config
    }

    /// Returns the number of sessions, established or not.
    pub fn sessions_count(&self) -> usize {
        self.sessions.len()
    }

    /// Returns an iterator over all established session addresses.
    pub fn established_sessions(&self) -> impl Iterator<Item = &SocketAddr> {
        self.sessions.iter().filter(|(_, s)| s.is_established()).map(|(addr, _)| addr)
    }

    /// Returns the number of established sessions.
    pub fn established_sessions_count(&self) -> usize {
        self.sessions.iter().filter(|(_, s)| s.is_established()).count()
    }
}
