use std::{net::SocketAddr, time::Instant};

use raklite_core::config::Config;
use raklite_peer::{PeerEvent, RakPeer};
use raklite_protocol::OfflineMessage;
use tracing::warn;

use crate::{
    event_types::{Action, Command, SocketEvent},
    session::Session,
};

fn translate(address: SocketAddr, events: Vec<PeerEvent>) -> Vec<Action<SocketEvent>> {
    events
        .into_iter()
        .map(|event| match event {
            PeerEvent::Connected => Action::Emit(SocketEvent::Connected(address)),
            PeerEvent::Packet(payload) => {
                Action::Emit(SocketEvent::Packet { address, payload })
            }
            PeerEvent::Disconnected(reason) => {
                Action::Emit(SocketEvent::Disconnected(address, reason))
            }
        })
        .collect()
}

impl Session for RakPeer {
    type SendEvent = Command;
    type ReceiveEvent = SocketEvent;

    fn create_incoming(
        config: &Config,
        address: SocketAddr,
        local_address: SocketAddr,
        time: Instant,
    ) -> RakPeer {
        RakPeer::new_incoming(config, address, local_address, time)
    }

    fn create_from_command(
        config: &Config,
        event: &Command,
        local_address: SocketAddr,
        time: Instant,
    ) -> Option<RakPeer> {
        match event {
            Command::Connect { address, password } => {
                Some(RakPeer::new_outgoing(config, *address, local_address, password.clone(), time))
            }
            // sends and disconnects towards unknown addresses open nothing
            _ => None,
        }
    }

    fn is_established(&self) -> bool {
        self.is_connected()
    }

    fn should_drop(&mut self, time: Instant) -> (bool, Vec<Action<SocketEvent>>) {
        let address = self.remote_address();
        let (drop_now, events) = RakPeer::should_drop(self, time);
        (drop_now, translate(address, events))
    }

    fn process_datagram(&mut self, payload: &[u8], time: Instant) -> Vec<Action<SocketEvent>> {
        let address = self.remote_address();
        let events = RakPeer::process_datagram(self, payload, time);
        translate(address, events)
    }

    fn process_event(&mut self, event: Command, time: Instant) -> Vec<Action<SocketEvent>> {
        let address = self.remote_address();
        match event {
            Command::Connect { .. } => {
                // (re)start the offline handshake; raw datagram, no framing
                vec![Action::Send(OfflineMessage::request().encode())]
            }
            Command::Send { payload, reliability, channel, .. } => {
                if let Err(err) = self.send_user(&payload, reliability, channel, time) {
                    warn!(remote = %address, "dropping queued send: {}", err);
                }
                Vec::new()
            }
            Command::Disconnect { .. } => {
                self.close(time);
                Vec::new()
            }
        }
    }

    fn on_offline_reply(&mut self, time: Instant) -> Vec<Action<SocketEvent>> {
        RakPeer::on_offline_reply(self, time);
        Vec::new()
    }

    fn on_offline_refusal(&mut self, _time: Instant) -> Vec<Action<SocketEvent>> {
        let address = self.remote_address();
        let mut events = Vec::new();
        RakPeer::on_offline_refusal(self, &mut events);
        translate(address, events)
    }

    fn disconnect(&mut self, time: Instant) -> Vec<Action<SocketEvent>> {
        self.close(time);
        Vec::new()
    }

    fn update(&mut self, time: Instant) -> Vec<Action<SocketEvent>> {
        let address = self.remote_address();
        let (datagrams, events) = RakPeer::update(self, time);
        let mut actions: Vec<Action<SocketEvent>> =
            datagrams.into_iter().map(Action::Send).collect();
        actions.extend(translate(address, events));
        actions
    }
}
