//! Player bookkeeping shared by both session roles.
//!
//! The server keeps [`ServerRoster`] in login order and never reorders it,
//! so the alive list it broadcasts is a subsequence of that order. Clients
//! keep peers in the same relative order, which lets [`PeerList::reconcile`]
//! diff the two lists with a single forward scan. Any subset of an ordered
//! list is still ordered, so the lone winner kept across a restart is
//! matched rather than recreated.

use std::collections::HashSet;

use glam::Vec3;

use crate::net::{AliveEntry, Color32, ConnectionId, PlayerId};

pub use crate::net::PlayerState;

const PALETTE: [Color32; 8] = [
    Color32::rgb(231, 76, 60),
    Color32::rgb(52, 152, 219),
    Color32::rgb(46, 204, 113),
    Color32::rgb(241, 196, 15),
    Color32::rgb(155, 89, 182),
    Color32::rgb(230, 126, 34),
    Color32::rgb(26, 188, 156),
    Color32::rgb(236, 240, 241),
];

pub fn palette_color(index: usize) -> Color32 {
    PALETTE[index % PALETTE.len()]
}

/// Remote avatar tracked by a client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSync {
    pub player_id: PlayerId,
    pub position: Vec3,
}

/// Client view of who is on the server. The local player sits at index 0.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: Vec<PlayerState>,
}

impl Roster {
    pub fn from_login(local: PlayerState, peers: Vec<PlayerState>) -> Self {
        let mut roster = Self {
            players: Vec::with_capacity(peers.len() + 1),
        };
        roster.players.push(local);
        for peer in peers {
            roster.add(peer);
        }
        roster
    }

    /// Ignores ids already present.
    pub fn add(&mut self, player: PlayerState) -> bool {
        if self.contains(player.id) {
            return false;
        }
        self.players.push(player);
        true
    }

    /// No-op for absent ids.
    pub fn remove_by_id(&mut self, id: PlayerId) -> Option<PlayerState> {
        let index = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(index))
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn local(&self) -> Option<&PlayerState> {
        self.players.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.iter()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }

    pub fn names_text(&self) -> String {
        self.players
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<PlayerId>,
    pub updated: Vec<PlayerId>,
    pub destroyed: Vec<PlayerId>,
}

impl ReconcileReport {
    pub fn has_membership_changes(&self) -> bool {
        !self.created.is_empty() || !self.destroyed.is_empty()
    }
}

/// Ordered remote avatars on a client.
#[derive(Debug, Clone, Default)]
pub struct PeerList {
    peers: Vec<PlayerSync>,
}

impl PeerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a STATE_UPDATE alive list in one forward pass. A local entry
    /// missing from the update is stale and dropped; an incoming id that is
    /// not the next local entry is new and inserted ahead of it. The local
    /// player's own entry is skipped.
    pub fn reconcile(
        &mut self,
        local_id: Option<PlayerId>,
        alive: &[AliveEntry],
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let incoming: HashSet<PlayerId> = alive.iter().map(|e| e.id).collect();
        let mut stale = std::mem::take(&mut self.peers).into_iter().peekable();

        for entry in alive.iter().filter(|e| Some(e.id) != local_id) {
            let matched = loop {
                match stale.peek() {
                    Some(&peer) if peer.player_id == entry.id => break stale.next(),
                    Some(&peer) if !incoming.contains(&peer.player_id) => {
                        report.destroyed.push(peer.player_id);
                        stale.next();
                    }
                    _ => break None,
                }
            };

            match matched {
                Some(mut peer) => {
                    peer.position = entry.position;
                    report.updated.push(entry.id);
                    self.peers.push(peer);
                }
                None => {
                    report.created.push(entry.id);
                    self.peers.push(PlayerSync {
                        player_id: entry.id,
                        position: entry.position,
                    });
                }
            }
        }

        report.destroyed.extend(stale.map(|peer| peer.player_id));
        report
    }

    /// Drops every avatar except the round winner's and returns the ids
    /// removed.
    pub fn retain_winner(&mut self, winner: i32) -> Vec<PlayerId> {
        let mut removed = Vec::new();
        self.peers.retain(|peer| {
            let keep = i64::from(peer.player_id) == i64::from(winner);
            if !keep {
                removed.push(peer.player_id);
            }
            keep
        });
        removed
    }

    pub fn get(&self, id: PlayerId) -> Option<&PlayerSync> {
        self.peers.iter().find(|p| p.player_id == id)
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.peers.iter().map(|p| p.player_id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerSync> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

/// Authoritative entry for a logged-in player. The player id is the
/// server-side connection id.
#[derive(Debug, Clone)]
pub struct ServerPlayer {
    pub state: PlayerState,
    pub position: Vec3,
    pub alive: bool,
}

impl ServerPlayer {
    pub fn id(&self) -> PlayerId {
        self.state.id
    }
}

/// Logged-in players in login order.
#[derive(Debug, Clone, Default)]
pub struct ServerRoster {
    players: Vec<ServerPlayer>,
}

impl ServerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, player: ServerPlayer) {
        self.players.push(player);
    }

    pub fn remove(&mut self, connection: ConnectionId) -> Option<ServerPlayer> {
        let index = self.players.iter().position(|p| p.id() == connection)?;
        Some(self.players.remove(index))
    }

    pub fn get(&self, connection: ConnectionId) -> Option<&ServerPlayer> {
        self.players.iter().find(|p| p.id() == connection)
    }

    pub fn get_mut(&mut self, connection: ConnectionId) -> Option<&mut ServerPlayer> {
        self.players.iter_mut().find(|p| p.id() == connection)
    }

    pub fn by_name(&self, name: &str) -> Option<&ServerPlayer> {
        self.players.iter().find(|p| p.state.name == name)
    }

    pub fn states(&self) -> Vec<PlayerState> {
        self.players.iter().map(|p| p.state.clone()).collect()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(ServerPlayer::id).collect()
    }

    pub fn alive_entries(&self) -> Vec<AliveEntry> {
        self.players
            .iter()
            .filter(|p| p.alive)
            .map(|p| AliveEntry {
                id: p.id(),
                position: p.position,
            })
            .collect()
    }

    pub fn alive_ids(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| p.alive)
            .map(ServerPlayer::id)
            .collect()
    }

    /// Returns false if the player was unknown or already out.
    pub fn eliminate(&mut self, id: PlayerId) -> bool {
        match self.get_mut(id) {
            Some(player) if player.alive => {
                player.alive = false;
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerPlayer> {
        self.players.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ServerPlayer> {
        self.players.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alive(ids: &[PlayerId]) -> Vec<AliveEntry> {
        ids.iter()
            .map(|&id| AliveEntry {
                id,
                position: Vec3::splat(id as f32),
            })
            .collect()
    }

    fn player(id: PlayerId, name: &str) -> PlayerState {
        PlayerState::new(id, name, palette_color(id as usize))
    }

    #[test]
    fn test_reconcile_drops_stale_updates_and_creates() {
        let mut peers = PeerList::new();
        peers.reconcile(None, &alive(&[1, 2, 3]));

        let report = peers.reconcile(None, &alive(&[2, 3, 4]));
        assert_eq!(report.destroyed, vec![1]);
        assert_eq!(report.updated, vec![2, 3]);
        assert_eq!(report.created, vec![4]);
        assert_eq!(peers.ids(), vec![2, 3, 4]);
        assert_eq!(peers.get(3).unwrap().position, Vec3::splat(3.0));
    }

    #[test]
    fn test_reconcile_trims_tail() {
        let mut peers = PeerList::new();
        peers.reconcile(None, &alive(&[1, 2, 3]));
        let report = peers.reconcile(None, &alive(&[1]));
        assert_eq!(report.destroyed, vec![2, 3]);
        assert_eq!(peers.ids(), vec![1]);

        let report = peers.reconcile(None, &[]);
        assert_eq!(report.destroyed, vec![1]);
        assert!(peers.is_empty());
    }

    #[test]
    fn test_reconcile_skips_local_player() {
        let mut peers = PeerList::new();
        let report = peers.reconcile(Some(2), &alive(&[1, 2, 3]));
        assert_eq!(report.created, vec![1, 3]);
        assert_eq!(peers.ids(), vec![1, 3]);
    }

    #[test]
    fn test_retain_winner() {
        let mut peers = PeerList::new();
        peers.reconcile(None, &alive(&[1, 2, 3]));
        assert_eq!(peers.retain_winner(2), vec![1, 3]);
        assert_eq!(peers.ids(), vec![2]);

        assert_eq!(peers.retain_winner(-1), vec![2]);
        assert!(peers.is_empty());
    }

    #[test]
    fn test_winner_survives_first_update_after_restart() {
        let mut peers = PeerList::new();
        peers.reconcile(Some(4), &alive(&[1, 2, 3, 4]));
        peers.retain_winner(2);

        let report = peers.reconcile(Some(4), &alive(&[1, 2, 3, 4]));
        assert!(report.destroyed.is_empty());
        assert_eq!(report.updated, vec![2]);
        assert_eq!(report.created, vec![1, 3]);
        assert_eq!(peers.ids(), vec![1, 2, 3]);
    }

    #[test]
    fn test_reconcile_inserts_new_ids_ahead_of_known_ones() {
        let mut peers = PeerList::new();
        peers.reconcile(None, &alive(&[2, 4]));

        let report = peers.reconcile(None, &alive(&[1, 2, 3, 4]));
        assert!(report.destroyed.is_empty());
        assert_eq!(report.updated, vec![2, 4]);
        assert_eq!(report.created, vec![1, 3]);
        assert_eq!(peers.ids(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_roster_keeps_local_first_and_removal_is_idempotent() {
        let mut roster = Roster::from_login(player(3, "me"), vec![player(1, "a"), player(2, "b")]);
        assert_eq!(roster.local().unwrap().id, 3);
        assert_eq!(roster.names_text(), "me\na\nb");

        assert!(roster.remove_by_id(1).is_some());
        assert!(roster.remove_by_id(1).is_none());
        assert_eq!(roster.len(), 2);

        assert!(roster.add(player(4, "c")));
        assert!(!roster.add(player(4, "c")));
        assert_eq!(roster.names_text(), "me\nb\nc");
    }

    #[test]
    fn test_server_roster_alive_order() {
        let mut roster = ServerRoster::new();
        for id in [5, 2, 9] {
            roster.add(ServerPlayer {
                state: player(id, "p"),
                position: Vec3::ZERO,
                alive: true,
            });
        }
        assert!(roster.eliminate(2));
        assert!(!roster.eliminate(2));
        assert_eq!(roster.alive_ids(), vec![5, 9]);

        roster.remove(5);
        assert!(roster.remove(5).is_none());
        assert_eq!(roster.ids(), vec![2, 9]);
    }
}
