use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::connection::{ConnectionId, ConnectionTable, LinkState};
use super::discovery::DiscoveryFilter;
use super::frame::{Channel, Frame, FrameBody, FrameError, MAX_FRAME_SIZE};
use super::stats::{NetworkStats, PacketLossSimulation};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("connection is not established")]
    NotConnected,
    #[error("payload of {0} bytes is too large")]
    PacketTooLarge(usize),
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub max_connections: usize,
    /// Whether unsolicited connect requests are accepted.
    pub accept_connections: bool,
    pub resend_interval: Duration,
    pub keepalive_interval: Duration,
    pub connect_timeout: Duration,
    pub connection_timeout: Duration,
    pub loss_simulation: Option<PacketLossSimulation>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_connections: 4,
            accept_connections: false,
            resend_interval: Duration::from_millis(200),
            keepalive_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(10),
            loss_simulation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    Connect(ConnectionId),
    Disconnect(ConnectionId),
    Data(ConnectionId, Vec<u8>),
    Broadcast { from: SocketAddr },
}

#[derive(Debug)]
struct Advertisement {
    target: SocketAddr,
    frame: Vec<u8>,
    interval: Duration,
    last_sent: Instant,
}

/// One UDP socket plus the links multiplexed over it.
///
/// Nothing here blocks. [`Host::poll_event`] services the socket and the
/// timers whenever its queue runs dry, so callers drain it in a loop until
/// it returns `None`.
pub struct Host {
    socket: UdpSocket,
    local_addr: SocketAddr,
    config: HostConfig,
    links: ConnectionTable,
    events: VecDeque<NetEvent>,
    stats: NetworkStats,
    recv_buffer: Vec<u8>,
    advertisement: Option<Advertisement>,
    listen_filter: Option<DiscoveryFilter>,
    last_broadcast: Option<(SocketAddr, Vec<u8>)>,
}

impl Host {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: HostConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        trace!("host bound on {}", local_addr);

        Ok(Self {
            socket,
            local_addr,
            links: ConnectionTable::new(config.max_connections),
            config,
            events: VecDeque::new(),
            stats: NetworkStats::default(),
            recv_buffer: vec![0u8; MAX_FRAME_SIZE],
            advertisement: None,
            listen_filter: None,
            last_broadcast: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn connection_count(&self) -> usize {
        self.links.connected_count()
    }

    /// Starts a connection attempt. The handle is valid immediately; a
    /// `Connect` event follows once the remote accepts, or a `Disconnect`
    /// event if it refuses or never answers.
    pub fn connect(&mut self, addr: SocketAddr) -> Result<ConnectionId, TransportError> {
        if let Some(id) = self.links.id_for(&addr) {
            return Ok(id);
        }
        let id = self
            .links
            .insert(addr, LinkState::Connecting)
            .map(|link| link.id)
            .ok_or(TransportError::NotConnected)?;

        info!("connecting to {} as link {}", addr, id);
        self.send_frame(FrameBody::ConnectRequest, addr)?;
        Ok(id)
    }

    pub fn send(
        &mut self,
        id: ConnectionId,
        channel: Channel,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(TransportError::PacketTooLarge(payload.len()));
        }
        let link = self
            .links
            .get_mut(id)
            .ok_or(TransportError::UnknownConnection(id))?;
        if link.state != LinkState::Connected {
            return Err(TransportError::NotConnected);
        }

        let sequence = match channel {
            Channel::Reliable => link.reliable_out.next_sequence(),
            Channel::Unreliable => link.next_unreliable_sequence(),
        };
        let bytes = Frame::new(FrameBody::Data {
            channel,
            sequence,
            payload: payload.to_vec(),
        })
        .serialize()?;

        if channel == Channel::Reliable {
            link.reliable_out.track(sequence, bytes.clone());
        }
        link.last_send_time = Instant::now();
        let addr = link.addr;

        self.send_raw(&bytes, addr)
    }

    /// Drops the link after telling the peer. No event is raised locally.
    pub fn disconnect(&mut self, id: ConnectionId) {
        let Some(link) = self.links.remove(id) else {
            return;
        };
        if let Err(e) = self.send_frame(FrameBody::Disconnect, link.addr) {
            debug!("disconnect notice to {} failed: {}", link.addr, e);
        }
        info!("link {} to {} closed", id, link.addr);
    }

    pub fn disconnect_all(&mut self) {
        for id in self.links.ids() {
            self.disconnect(id);
        }
    }

    /// Advertises `payload` to `target` every `interval`. The first
    /// advertisement goes out immediately so a failure to broadcast at all
    /// is reported here rather than swallowed later.
    pub fn start_broadcast_discovery(
        &mut self,
        target: SocketAddr,
        filter: DiscoveryFilter,
        payload: Vec<u8>,
        interval: Duration,
    ) -> Result<(), TransportError> {
        self.socket.set_broadcast(true)?;
        let frame = Frame::new(FrameBody::Broadcast {
            key: filter.key,
            version: filter.version,
            subversion: filter.subversion,
            payload,
        })
        .serialize()?;

        self.socket.send_to(&frame, target)?;
        self.stats.record_sent(frame.len());

        info!("advertising to {} every {:?}", target, interval);
        self.advertisement = Some(Advertisement {
            target,
            frame,
            interval,
            last_sent: Instant::now(),
        });
        Ok(())
    }

    pub fn stop_broadcast_discovery(&mut self) {
        self.advertisement = None;
    }

    /// Accept broadcasts that match `filter`; everything else is dropped.
    pub fn set_broadcast_credentials(&mut self, filter: DiscoveryFilter) {
        self.listen_filter = Some(filter);
    }

    /// Payload of the most recent accepted broadcast.
    pub fn broadcast_message(&self) -> Option<&[u8]> {
        self.last_broadcast
            .as_ref()
            .map(|(_, payload)| payload.as_slice())
    }

    pub fn poll_event(&mut self) -> Result<Option<NetEvent>, TransportError> {
        if self.events.is_empty() {
            self.service()?;
        }
        Ok(self.events.pop_front())
    }

    fn service(&mut self) -> Result<(), TransportError> {
        self.receive()?;
        self.maintain_links();
        self.advertise();
        Ok(())
    }

    fn receive(&mut self) -> Result<(), TransportError> {
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    self.stats.record_received(size);
                    match Frame::deserialize(&self.recv_buffer[..size]) {
                        Ok(frame) => self.handle_frame(frame.body, addr),
                        Err(e) => {
                            self.stats.packets_dropped += 1;
                            debug!("dropped {} bytes from {}: {}", size, addr, e);
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    trace!("ignoring ICMP error: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, body: FrameBody, addr: SocketAddr) {
        if let Some(link) = self.links.get_by_addr_mut(&addr) {
            link.touch();
        }

        match body {
            FrameBody::ConnectRequest => self.handle_connect_request(addr),
            FrameBody::ConnectAccept { connection_id } => {
                let Some(link) = self.links.get_by_addr_mut(&addr) else {
                    return;
                };
                if link.state == LinkState::Connecting {
                    link.state = LinkState::Connected;
                    info!(
                        "link {} connected to {} as remote link {}",
                        link.id, addr, connection_id
                    );
                    self.events.push_back(NetEvent::Connect(link.id));
                }
            }
            FrameBody::ConnectReject { reason } => {
                let Some(id) = self.links.id_for(&addr) else {
                    return;
                };
                warn!("{} refused connection: {}", addr, reason);
                self.links.remove(id);
                self.events.push_back(NetEvent::Disconnect(id));
            }
            FrameBody::Data {
                channel,
                sequence,
                payload,
            } => self.handle_data(addr, channel, sequence, payload),
            FrameBody::Ack { sequence } => {
                let Some(link) = self.links.get_by_addr_mut(&addr) else {
                    return;
                };
                if link.reliable_out.acknowledge(sequence) {
                    self.stats.rtt_ms = link.reliable_out.srtt();
                    self.stats.rtt_variance = link.reliable_out.rtt_var();
                }
            }
            FrameBody::Ping => {}
            FrameBody::Disconnect => {
                if let Some(id) = self.links.id_for(&addr) {
                    info!("link {} closed by {}", id, addr);
                    self.links.remove(id);
                    self.events.push_back(NetEvent::Disconnect(id));
                }
            }
            FrameBody::Broadcast {
                key,
                version,
                subversion,
                payload,
            } => {
                let accepted = self
                    .listen_filter
                    .is_some_and(|filter| filter.matches(key, version, subversion));
                if !accepted {
                    trace!(
                        "ignoring broadcast from {} ({}/{}/{})",
                        addr, key, version, subversion
                    );
                    self.stats.packets_dropped += 1;
                    return;
                }
                self.last_broadcast = Some((addr, payload));
                self.events.push_back(NetEvent::Broadcast { from: addr });
            }
        }
    }

    fn handle_connect_request(&mut self, addr: SocketAddr) {
        if !self.config.accept_connections {
            return;
        }

        // A repeated request means our accept was lost.
        if let Some(id) = self.links.id_for(&addr) {
            if let Err(e) = self.send_frame(FrameBody::ConnectAccept { connection_id: id }, addr) {
                warn!("failed to re-accept {}: {}", addr, e);
            }
            return;
        }

        let Some(id) = self
            .links
            .insert(addr, LinkState::Connected)
            .map(|link| link.id)
        else {
            warn!("refusing {}: host full", addr);
            let reason = String::from("host full");
            if let Err(e) = self.send_frame(FrameBody::ConnectReject { reason }, addr) {
                debug!("reject to {} failed: {}", addr, e);
            }
            return;
        };

        if let Err(e) = self.send_frame(FrameBody::ConnectAccept { connection_id: id }, addr) {
            warn!("failed to accept {}: {}", addr, e);
        }
        info!("accepted {} as link {}", addr, id);
        self.events.push_back(NetEvent::Connect(id));
    }

    fn handle_data(&mut self, addr: SocketAddr, channel: Channel, sequence: u32, payload: Vec<u8>) {
        let Some(link) = self.links.get_by_addr_mut(&addr) else {
            trace!("data from unknown peer {}", addr);
            return;
        };
        if link.state != LinkState::Connected {
            return;
        }
        let id = link.id;

        match channel {
            Channel::Reliable => {
                for delivered in link.reliable_in.accept(sequence, payload) {
                    self.events.push_back(NetEvent::Data(id, delivered));
                }
                // Duplicates are acked again in case the first ack was lost.
                if let Err(e) = self.send_frame(FrameBody::Ack { sequence }, addr) {
                    debug!("ack to {} failed: {}", addr, e);
                }
            }
            Channel::Unreliable => {
                if link.unreliable_in.accept(sequence) {
                    self.events.push_back(NetEvent::Data(id, payload));
                }
            }
        }
    }

    fn maintain_links(&mut self) {
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut outgoing: Vec<(SocketAddr, Vec<u8>, bool)> = Vec::new();

        for link in self.links.iter_mut() {
            match link.state {
                LinkState::Connecting => {
                    if now.duration_since(link.created) > self.config.connect_timeout {
                        warn!("connect to {} timed out", link.addr);
                        expired.push(link.id);
                    } else if now.duration_since(link.last_send_time)
                        >= self.config.resend_interval
                    {
                        link.last_send_time = now;
                        if let Ok(bytes) = Frame::new(FrameBody::ConnectRequest).serialize() {
                            outgoing.push((link.addr, bytes, true));
                        }
                    }
                }
                LinkState::Connected => {
                    if link.is_timed_out(self.config.connection_timeout) {
                        warn!("link {} to {} timed out", link.id, link.addr);
                        expired.push(link.id);
                        continue;
                    }
                    for bytes in link
                        .reliable_out
                        .due_for_resend(now, self.config.resend_interval)
                    {
                        outgoing.push((link.addr, bytes, true));
                    }
                    if now.duration_since(link.last_send_time) >= self.config.keepalive_interval {
                        link.last_send_time = now;
                        if let Ok(bytes) = Frame::new(FrameBody::Ping).serialize() {
                            outgoing.push((link.addr, bytes, false));
                        }
                    }
                }
            }
        }

        for id in expired {
            self.links.remove(id);
            self.events.push_back(NetEvent::Disconnect(id));
        }

        for (addr, bytes, resend) in outgoing {
            if resend {
                self.stats.packets_resent += 1;
            }
            if let Err(e) = self.send_raw(&bytes, addr) {
                debug!("send to {} failed: {}", addr, e);
            }
        }
    }

    fn advertise(&mut self) {
        let Some(advertisement) = self.advertisement.as_mut() else {
            return;
        };
        if advertisement.last_sent.elapsed() < advertisement.interval {
            return;
        }
        advertisement.last_sent = Instant::now();

        match self
            .socket
            .send_to(&advertisement.frame, advertisement.target)
        {
            Ok(bytes) => self.stats.record_sent(bytes),
            Err(e) => warn!("broadcast to {} failed: {}", advertisement.target, e),
        }
    }

    fn send_frame(&mut self, body: FrameBody, addr: SocketAddr) -> Result<(), TransportError> {
        let bytes = Frame::new(body).serialize()?;
        self.send_raw(&bytes, addr)
    }

    fn send_raw(&mut self, bytes: &[u8], addr: SocketAddr) -> Result<(), TransportError> {
        if self
            .config
            .loss_simulation
            .as_ref()
            .is_some_and(|sim| sim.should_drop())
        {
            trace!("simulated loss of {} bytes to {}", bytes.len(), addr);
            return Ok(());
        }
        let sent = self.socket.send_to(bytes, addr)?;
        self.stats.record_sent(sent);
        Ok(())
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}
