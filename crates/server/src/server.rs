use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use glam::Vec3;

use bomberlan::{
    MemoryCredentialStore, NetworkStats, PlayerId, ServerEvent, ServerSession, SessionError,
    TileWorld,
};

use crate::config::ServerConfig;

#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub uptime_secs: u64,
    pub tick: u64,
    pub connection_count: usize,
    pub max_connections: usize,
    pub player_count: usize,
    pub network_stats: NetworkStats,
}

#[derive(Debug, Clone)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub alive: bool,
    pub position: Vec3,
}

/// Runs a [`ServerSession`] at a fixed tick rate.
pub struct GameServer {
    session: ServerSession<TileWorld, MemoryCredentialStore>,
    tick_duration: Duration,
    last_tick_time: Instant,
    accumulator: Duration,
    running: Arc<AtomicBool>,
    start_time: Instant,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Result<Self, SessionError> {
        let world = match config.seed {
            Some(seed) => TileWorld::with_seed(seed),
            None => TileWorld::new(),
        };
        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate.max(1) as f64);

        let mut session = ServerSession::new(config.session, world, MemoryCredentialStore::new());
        session.start()?;

        Ok(Self {
            session,
            tick_duration,
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.session.drain_events()
    }

    pub fn run(&mut self) -> Result<(), SessionError> {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once()?;
            for event in self.session.drain_events() {
                log::debug!("{:?}", event);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown();
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.session.stop();
    }

    pub fn tick_once(&mut self) -> Result<(), SessionError> {
        let now = Instant::now();
        self.accumulator += now - self.last_tick_time;
        self.last_tick_time = now;

        let dt = self.tick_duration.as_secs_f32();
        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            self.session.tick(dt)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            tick: self.session.tick_count(),
            connection_count: self.session.connection_count(),
            max_connections: self.session.config().max_connections,
            player_count: self.session.roster().len(),
            network_stats: self.session.stats(),
        }
    }

    pub fn players(&self) -> Vec<PlayerInfo> {
        self.session
            .roster()
            .iter()
            .map(|player| PlayerInfo {
                id: player.id(),
                name: player.state.name.clone(),
                alive: player.alive,
                position: player.position,
            })
            .collect()
    }
}
