use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::tracking::{ReliableReceiver, ReliableSender, SequencedReceiver};

pub type ConnectionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
}

/// Per-peer transport state.
#[derive(Debug)]
pub struct Link {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub state: LinkState,
    pub reliable_out: ReliableSender,
    pub reliable_in: ReliableReceiver,
    pub unreliable_sequence: u32,
    pub unreliable_in: SequencedReceiver,
    pub created: Instant,
    pub last_receive_time: Instant,
    pub last_send_time: Instant,
}

impl Link {
    pub fn new(id: ConnectionId, addr: SocketAddr, state: LinkState) -> Self {
        let now = Instant::now();
        Self {
            id,
            addr,
            state,
            reliable_out: ReliableSender::new(),
            reliable_in: ReliableReceiver::new(),
            unreliable_sequence: 0,
            unreliable_in: SequencedReceiver::default(),
            created: now,
            last_receive_time: now,
            last_send_time: now,
        }
    }

    pub fn next_unreliable_sequence(&mut self) -> u32 {
        let sequence = self.unreliable_sequence;
        self.unreliable_sequence = self.unreliable_sequence.wrapping_add(1);
        sequence
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_receive_time.elapsed() > timeout
    }

    pub fn touch(&mut self) {
        self.last_receive_time = Instant::now();
    }
}

#[derive(Debug)]
pub struct ConnectionTable {
    ids_by_addr: HashMap<SocketAddr, ConnectionId>,
    links: HashMap<ConnectionId, Link>,
    next_id: ConnectionId,
    max_connections: usize,
}

impl ConnectionTable {
    pub fn new(max_connections: usize) -> Self {
        Self {
            ids_by_addr: HashMap::new(),
            links: HashMap::new(),
            next_id: 1,
            max_connections,
        }
    }

    /// Returns `None` when the table is full.
    pub fn insert(&mut self, addr: SocketAddr, state: LinkState) -> Option<&mut Link> {
        if self.links.len() >= self.max_connections {
            return None;
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        self.ids_by_addr.insert(addr, id);
        Some(self.links.entry(id).or_insert(Link::new(id, addr, state)))
    }

    pub fn id_for(&self, addr: &SocketAddr) -> Option<ConnectionId> {
        self.ids_by_addr.get(addr).copied()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Link> {
        self.links.get_mut(&id)
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut Link> {
        let id = self.ids_by_addr.get(addr)?;
        self.links.get_mut(id)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Link> {
        let link = self.links.remove(&id)?;
        self.ids_by_addr.remove(&link.addr);
        Some(link)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.links.keys().copied().collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Link> {
        self.links.values_mut()
    }

    pub fn connected_count(&self) -> usize {
        self.links
            .values()
            .filter(|l| l.state == LinkState::Connected)
            .count()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
