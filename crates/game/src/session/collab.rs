//! Contracts for the parts of the game the session layer drives but does
//! not own.

use std::collections::HashMap;

use glam::Vec3;

use crate::net::{AliveEntry, Color32, PlayerId};

#[derive(Debug, Clone, PartialEq)]
pub struct GameOver {
    /// `-1` when nobody survived.
    pub winner: i32,
    pub message: String,
}

pub trait World {
    /// Row-major, one byte per tile.
    fn tile_snapshot(&self) -> Vec<u8>;

    /// Replaces the board with one received from the server.
    fn load_tiles(&mut self, tiles: &[u8]);

    fn random_spawn_position(&mut self) -> Vec3;

    fn place_bomb(&mut self, position: Vec3, remote_origin: bool);

    /// Runs the world forward and returns players eliminated during the step.
    fn advance(&mut self, dt: f32, players: &[AliveEntry]) -> Vec<PlayerId> {
        let _ = (dt, players);
        Vec::new()
    }

    fn on_game_over(&mut self, survivors: &[PlayerId]) -> Option<GameOver>;

    /// Fresh board for the next round.
    fn regenerate(&mut self);
}

pub trait UiSink {
    fn set_status_text(&mut self, text: &str, color: Color32, animated: bool);
    fn set_player_names(&mut self, names: &str);
    fn process_chat_string(&mut self, name: &str, color: Color32, message: &str);
    fn fade_out_with_text(&mut self, message: &str);
}

pub trait CredentialStore {
    fn has_credential(&self, name: &str) -> bool;
    fn verify(&self, name: &str, password: &str) -> bool;
    fn store(&mut self, name: &str, password: &str);
}

/// Credentials that live as long as the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryCredentialStore {
    credentials: HashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn has_credential(&self, name: &str) -> bool {
        self.credentials.contains_key(name)
    }

    fn verify(&self, name: &str, password: &str) -> bool {
        self.credentials
            .get(name)
            .is_some_and(|stored| stored == password)
    }

    fn store(&mut self, name: &str, password: &str) {
        self.credentials
            .entry(name.to_string())
            .or_insert_with(|| password.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_write_wins() {
        let mut store = MemoryCredentialStore::new();
        assert!(!store.has_credential("ann"));

        store.store("ann", "pw");
        store.store("ann", "other");

        assert!(store.has_credential("ann"));
        assert!(store.verify("ann", "pw"));
        assert!(!store.verify("ann", "other"));
        assert!(!store.verify("bob", "pw"));
        assert_eq!(store.len(), 1);
    }
}
