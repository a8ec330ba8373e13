//! Default bomber board used by both binaries.

use glam::Vec3;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::net::{AliveEntry, PlayerId};
use crate::session::{GameOver, World};

pub const WIDTH: usize = 23;
pub const HEIGHT: usize = 17;
pub const TILE_SIZE: f32 = 2.0;
pub const BOMB_FUSE: f32 = 2.0;
pub const BLAST_RANGE: usize = 2;
const CRACKED_WALL_CHANCE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tile {
    Ground = 0,
    Wall = 1,
    WallCracked = 2,
    Bomb = 3,
}

impl Tile {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Tile::Ground),
            1 => Some(Tile::Wall),
            2 => Some(Tile::WallCracked),
            3 => Some(Tile::Bomb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bomb {
    x: usize,
    y: usize,
    fuse: f32,
}

pub struct TileWorld {
    tiles: Vec<u8>,
    bombs: Vec<Bomb>,
    rng: StdRng,
    /// Most players alive at once this round.
    round_peak: usize,
}

impl Default for TileWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TileWorld {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        let mut world = Self {
            tiles: vec![Tile::Ground as u8; WIDTH * HEIGHT],
            bombs: Vec::new(),
            rng,
            round_peak: 0,
        };
        world.generate();
        world
    }

    fn generate(&mut self) {
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                let border = x == 0 || y == 0 || x == WIDTH - 1 || y == HEIGHT - 1;
                let pillar = x % 2 == 0 && y % 2 == 0;
                let tile = if border || pillar {
                    Tile::Wall
                } else if self.rng.random_bool(CRACKED_WALL_CHANCE) {
                    Tile::WallCracked
                } else {
                    Tile::Ground
                };
                self.tiles[y * WIDTH + x] = tile as u8;
            }
        }
        self.bombs.clear();
        self.round_peak = 0;
    }

    pub fn tile(&self, x: usize, y: usize) -> Option<Tile> {
        if x >= WIDTH || y >= HEIGHT {
            return None;
        }
        Tile::from_byte(self.tiles[y * WIDTH + x])
    }

    fn set_tile(&mut self, x: usize, y: usize, tile: Tile) {
        self.tiles[y * WIDTH + x] = tile as u8;
    }

    pub fn bomb_count(&self) -> usize {
        self.bombs.len()
    }

    pub fn tile_center(x: usize, y: usize) -> Vec3 {
        Vec3::new(x as f32 * TILE_SIZE, 0.0, y as f32 * TILE_SIZE)
    }

    /// Tile under a world position, if it lies on the board.
    pub fn tile_at(position: Vec3) -> Option<(usize, usize)> {
        let x = (position.x / TILE_SIZE).round();
        let y = (position.z / TILE_SIZE).round();
        if x < 0.0 || y < 0.0 || x >= WIDTH as f32 || y >= HEIGHT as f32 {
            return None;
        }
        Some((x as usize, y as usize))
    }

    fn explode(&mut self, first: Bomb) -> Vec<(usize, usize)> {
        let mut blast = Vec::new();
        let mut queue = vec![first];

        while let Some(bomb) = queue.pop() {
            self.set_tile(bomb.x, bomb.y, Tile::Ground);
            blast.push((bomb.x, bomb.y));

            for (dx, dy) in [(1i32, 0i32), (-1, 0), (0, 1), (0, -1)] {
                for step in 1..=BLAST_RANGE as i32 {
                    let x = bomb.x as i32 + dx * step;
                    let y = bomb.y as i32 + dy * step;
                    if x < 0 || y < 0 {
                        break;
                    }
                    let (x, y) = (x as usize, y as usize);
                    match self.tile(x, y) {
                        None | Some(Tile::Wall) => break,
                        Some(Tile::WallCracked) => {
                            self.set_tile(x, y, Tile::Ground);
                            blast.push((x, y));
                            break;
                        }
                        Some(Tile::Bomb) => {
                            if let Some(index) =
                                self.bombs.iter().position(|b| b.x == x && b.y == y)
                            {
                                queue.push(self.bombs.remove(index));
                            }
                            blast.push((x, y));
                            break;
                        }
                        Some(Tile::Ground) => blast.push((x, y)),
                    }
                }
            }
        }
        blast
    }
}

impl World for TileWorld {
    fn tile_snapshot(&self) -> Vec<u8> {
        self.tiles.clone()
    }

    fn load_tiles(&mut self, tiles: &[u8]) {
        if tiles.len() != WIDTH * HEIGHT {
            warn!(
                "ignoring board of {} tiles, expected {}",
                tiles.len(),
                WIDTH * HEIGHT
            );
            return;
        }
        self.tiles.copy_from_slice(tiles);
        self.bombs.clear();
        // Bombs are not part of the snapshot.
        for tile in &mut self.tiles {
            if *tile == Tile::Bomb as u8 {
                *tile = Tile::Ground as u8;
            }
        }
    }

    fn random_spawn_position(&mut self) -> Vec3 {
        let ground: Vec<(usize, usize)> = (0..HEIGHT)
            .flat_map(|y| (0..WIDTH).map(move |x| (x, y)))
            .filter(|&(x, y)| self.tile(x, y) == Some(Tile::Ground))
            .collect();
        match ground.choose(&mut self.rng) {
            Some(&(x, y)) => Self::tile_center(x, y),
            None => Self::tile_center(1, 1),
        }
    }

    fn place_bomb(&mut self, position: Vec3, remote_origin: bool) {
        let Some((x, y)) = Self::tile_at(position) else {
            return;
        };
        if self.tile(x, y) != Some(Tile::Ground) {
            return;
        }
        debug!(
            "bomb at ({}, {}){}",
            x,
            y,
            if remote_origin { " from peer" } else { "" }
        );
        self.set_tile(x, y, Tile::Bomb);
        self.bombs.push(Bomb {
            x,
            y,
            fuse: BOMB_FUSE,
        });
    }

    fn advance(&mut self, dt: f32, players: &[AliveEntry]) -> Vec<PlayerId> {
        for bomb in &mut self.bombs {
            bomb.fuse -= dt;
        }

        let mut blast = Vec::new();
        while let Some(index) = self.bombs.iter().position(|b| b.fuse <= 0.0) {
            let bomb = self.bombs.remove(index);
            blast.extend(self.explode(bomb));
        }
        if blast.is_empty() {
            return Vec::new();
        }

        players
            .iter()
            .filter(|p| Self::tile_at(p.position).is_some_and(|tile| blast.contains(&tile)))
            .map(|p| p.id)
            .collect()
    }

    fn on_game_over(&mut self, survivors: &[PlayerId]) -> Option<GameOver> {
        self.round_peak = self.round_peak.max(survivors.len());
        if self.round_peak < 2 || survivors.len() > 1 {
            return None;
        }

        Some(match survivors.first() {
            Some(&id) => GameOver {
                winner: id as i32,
                message: format!("Player {} wins!", id),
            },
            None => GameOver {
                winner: -1,
                message: String::from("Draw!"),
            },
        })
    }

    fn regenerate(&mut self) {
        self.generate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleared_world() -> TileWorld {
        let mut world = TileWorld::with_seed(7);
        for y in 1..HEIGHT - 1 {
            for x in 1..WIDTH - 1 {
                if world.tile(x, y) == Some(Tile::WallCracked) {
                    world.set_tile(x, y, Tile::Ground);
                }
            }
        }
        world
    }

    #[test]
    fn test_board_layout() {
        let world = TileWorld::with_seed(1);
        assert_eq!(world.tile_snapshot().len(), WIDTH * HEIGHT);
        assert_eq!(world.tile(0, 5), Some(Tile::Wall));
        assert_eq!(world.tile(WIDTH - 1, 3), Some(Tile::Wall));
        assert_eq!(world.tile(2, 2), Some(Tile::Wall));
        assert_ne!(world.tile(1, 1), Some(Tile::Wall));
    }

    #[test]
    fn test_spawn_is_on_ground() {
        let mut world = TileWorld::with_seed(3);
        for _ in 0..20 {
            let (x, y) = TileWorld::tile_at(world.random_spawn_position()).unwrap();
            assert_eq!(world.tile(x, y), Some(Tile::Ground));
        }
    }

    #[test]
    fn test_blast_eliminates_player_in_range_and_stops_at_walls() {
        let mut world = cleared_world();
        world.place_bomb(TileWorld::tile_center(1, 1), false);
        assert_eq!(world.tile(1, 1), Some(Tile::Bomb));

        let players = [
            AliveEntry {
                id: 1,
                position: TileWorld::tile_center(3, 1),
            },
            AliveEntry {
                id: 2,
                position: TileWorld::tile_center(4, 1),
            },
            AliveEntry {
                id: 3,
                position: TileWorld::tile_center(3, 3),
            },
        ];
        assert!(world.advance(1.0, &players).is_empty());
        assert_eq!(world.advance(1.5, &players), vec![1]);
        assert_eq!(world.tile(1, 1), Some(Tile::Ground));
        assert_eq!(world.bomb_count(), 0);
    }

    #[test]
    fn test_bombs_chain() {
        let mut world = cleared_world();
        world.place_bomb(TileWorld::tile_center(1, 1), false);
        world.advance(1.9, &[]);
        world.place_bomb(TileWorld::tile_center(3, 1), true);
        assert_eq!(world.bomb_count(), 2);

        let victim = [AliveEntry {
            id: 9,
            position: TileWorld::tile_center(5, 1),
        }];
        assert_eq!(world.advance(0.2, &victim), vec![9]);
        assert_eq!(world.bomb_count(), 0);
    }

    #[test]
    fn test_cracked_wall_is_cleared_and_stops_blast() {
        let mut world = cleared_world();
        world.set_tile(2, 1, Tile::WallCracked);
        world.place_bomb(TileWorld::tile_center(1, 1), false);

        let behind = [AliveEntry {
            id: 4,
            position: TileWorld::tile_center(3, 1),
        }];
        assert!(world.advance(BOMB_FUSE, &behind).is_empty());
        assert_eq!(world.tile(2, 1), Some(Tile::Ground));
    }

    #[test]
    fn test_game_over_needs_two_participants() {
        let mut world = TileWorld::with_seed(5);
        assert_eq!(world.on_game_over(&[1]), None);
        assert_eq!(world.on_game_over(&[1, 2]), None);

        let over = world.on_game_over(&[2]).unwrap();
        assert_eq!(over.winner, 2);

        world.regenerate();
        assert_eq!(world.on_game_over(&[]), None);
        world.on_game_over(&[1, 2]);
        assert_eq!(world.on_game_over(&[]).unwrap().winner, -1);
    }

    #[test]
    fn test_load_tiles_rejects_wrong_size() {
        let mut world = TileWorld::with_seed(5);
        let before = world.tile_snapshot();
        world.load_tiles(&[0; 4]);
        assert_eq!(world.tile_snapshot(), before);

        world.load_tiles(&vec![Tile::Ground as u8; WIDTH * HEIGHT]);
        assert_eq!(world.tile(0, 0), Some(Tile::Ground));
    }
}
