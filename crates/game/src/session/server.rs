use std::collections::VecDeque;
use std::net::SocketAddr;

use log::{debug, error, info, warn};

use crate::net::{
    Announcement, Channel, ClientMessage, ConnectionId, Host, LoginGrant, LoginRejection,
    MAX_NAME_LEN, NetEvent, NetworkStats, PlayerId, PlayerState, ServerMessage,
};

use super::collab::{CredentialStore, GameOver, World};
use super::config::SessionConfig;
use super::error::SessionError;
use super::events::ServerEvent;
use super::registry::{ServerPlayer, ServerRoster, palette_color};
use super::timer::Countdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    /// Bound and advertising; nobody has logged in yet.
    Listening,
    Running,
    Terminated,
}

/// Authoritative side of a game session.
pub struct ServerSession<W, C> {
    config: SessionConfig,
    state: ServerState,
    host: Option<Host>,
    world: W,
    credentials: C,
    connections: Vec<ConnectionId>,
    roster: ServerRoster,
    pending_left: Vec<PlayerId>,
    logins: usize,
    state_timer: Countdown,
    tick: u64,
    pending_events: VecDeque<ServerEvent>,
}

impl<W: World, C: CredentialStore> ServerSession<W, C> {
    pub fn new(config: SessionConfig, world: W, credentials: C) -> Self {
        let state_timer = Countdown::new(config.state_interval);
        Self {
            config,
            state: ServerState::Idle,
            host: None,
            world,
            credentials,
            connections: Vec::new(),
            roster: ServerRoster::new(),
            pending_left: Vec::new(),
            logins: 0,
            state_timer,
            tick: 0,
            pending_events: VecDeque::new(),
        }
    }

    /// Binds the server port and starts advertising. Failing to advertise
    /// leaves the session terminated: no client could ever find it.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != ServerState::Idle {
            return Ok(());
        }

        let mut host = match Host::bind(self.config.server_addr(), self.config.server_host_config())
        {
            Ok(host) => host,
            Err(e) => {
                self.state = ServerState::Terminated;
                return Err(e.into());
            }
        };

        let advertisement = Announcement::default().encode()?;
        if let Err(e) = host.start_broadcast_discovery(
            self.config.broadcast_target(),
            self.config.discovery_filter(),
            advertisement,
            self.config.broadcast_interval,
        ) {
            error!("could not start broadcast discovery: {}", e);
            self.state = ServerState::Terminated;
            return Err(SessionError::DiscoveryStart(e));
        }

        let addr = host.local_addr();
        info!("server listening on {}", addr);
        self.host = Some(host);
        self.state = ServerState::Listening;
        self.pending_events.push_back(ServerEvent::Started { addr });
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut host) = self.host.take() {
            host.stop_broadcast_discovery();
            host.disconnect_all();
            info!("server stopped");
            self.pending_events.push_back(ServerEvent::Stopped);
        }
        self.connections.clear();
        self.roster = ServerRoster::new();
        self.pending_left.clear();
        self.state = ServerState::Terminated;
    }

    pub fn tick(&mut self, dt: f32) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::NotRunning);
        }
        self.tick += 1;

        while let Some(event) = self.host_mut()?.poll_event()? {
            self.handle_net_event(event);
        }

        if !self.roster.is_empty() {
            self.advance_world(dt);
        }

        if self.state_timer.tick(dt) {
            self.state_timer.reset(self.config.state_interval);
            self.broadcast_state();
        }
        Ok(())
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ServerState::Listening | ServerState::Running)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.host.as_ref().map(Host::local_addr)
    }

    pub fn stats(&self) -> NetworkStats {
        self.host
            .as_ref()
            .map(|host| host.stats().clone())
            .unwrap_or_default()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn roster(&self) -> &ServerRoster {
        &self.roster
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn host_mut(&mut self) -> Result<&mut Host, SessionError> {
        self.host.as_mut().ok_or(SessionError::NotRunning)
    }

    fn handle_net_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Connect(connection) => {
                debug!("connection {} opened", connection);
                self.connections.push(connection);
                self.pending_events
                    .push_back(ServerEvent::ClientConnected { connection });
            }
            NetEvent::Disconnect(connection) => self.handle_disconnect(connection),
            NetEvent::Data(connection, bytes) => self.handle_data(connection, &bytes),
            NetEvent::Broadcast { .. } => {}
        }
    }

    fn handle_disconnect(&mut self, connection: ConnectionId) {
        self.connections.retain(|&c| c != connection);
        let player = self.roster.remove(connection);
        if let Some(player) = &player {
            info!("{} left", player.state.name);
            self.pending_left.push(player.id());
        }
        self.pending_events.push_back(ServerEvent::ClientDisconnected {
            connection,
            name: player.map(|p| p.state.name),
        });
    }

    fn handle_data(&mut self, connection: ConnectionId, bytes: &[u8]) {
        let message = match ClientMessage::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                error!("protocol error from connection {}: {}", connection, e);
                self.pending_events.push_back(ServerEvent::ProtocolError {
                    connection,
                    message: e.to_string(),
                });
                return;
            }
        };

        let authenticated = self.roster.get(connection).is_some();
        if !authenticated && !matches!(message, ClientMessage::Login { .. }) {
            debug!(
                "ignoring {:?} from unauthenticated connection {}",
                message.kind(),
                connection
            );
            return;
        }

        match message {
            ClientMessage::Login { name, password } => {
                self.handle_login(connection, name, password);
            }
            ClientMessage::Position { position } => {
                if let Some(player) = self.roster.get_mut(connection) {
                    if player.alive {
                        player.position = position;
                    }
                }
            }
            ClientMessage::SpawnBomb { position } => {
                self.world.place_bomb(position, true);
                self.send_to_others(connection, &ServerMessage::SpawnBomb { position });
            }
            ClientMessage::Chat {
                name,
                color,
                message,
            } => {
                info!("[chat] {}: {}", name, message);
                self.pending_events.push_back(ServerEvent::Chat {
                    name: name.clone(),
                    message: message.clone(),
                });
                self.send_to_others(
                    connection,
                    &ServerMessage::Chat {
                        name,
                        color,
                        message,
                    },
                );
            }
        }
    }

    fn handle_login(&mut self, connection: ConnectionId, name: String, password: String) {
        // A wrong password wins over a duplicate name.
        let wrong_password =
            self.credentials.has_credential(&name) && !self.credentials.verify(&name, &password);
        let rejection = if name.len() > MAX_NAME_LEN || wrong_password {
            Some(LoginRejection::InvalidCredentials)
        } else if self.roster.get(connection).is_some() || self.roster.by_name(&name).is_some() {
            Some(LoginRejection::AlreadyLoggedIn)
        } else {
            None
        };

        if let Some(rejection) = rejection {
            warn!("login for {} on connection {} rejected: {:?}", name, connection, rejection);
            self.reject_login(connection, name, rejection);
            return;
        }

        let player = PlayerState::new(connection, name, palette_color(self.logins));
        let spawn = self.world.random_spawn_position();

        let grant = LoginGrant {
            player: player.clone(),
            peers: self.roster.states(),
            tiles: self.world.tile_snapshot(),
            spawn,
        };
        if let Err(e) = self.try_send(connection, &ServerMessage::LoginAccepted(grant)) {
            error!("login reply for {} could not be sent: {}", player.name, e);
            self.reject_login(connection, player.name, LoginRejection::InvalidCredentials);
            return;
        }
        self.send_to_others(connection, &ServerMessage::PlayerJoin(player.clone()));

        let registered = !self.credentials.has_credential(&player.name);
        if registered {
            self.credentials.store(&player.name, &password);
        }
        self.logins += 1;

        info!("{} logged in as player {}", player.name, connection);
        self.pending_events.push_back(ServerEvent::LoginAccepted {
            id: connection,
            name: player.name.clone(),
            registered,
        });
        self.roster.add(ServerPlayer {
            state: player,
            position: spawn,
            alive: true,
        });
        self.state = ServerState::Running;
    }

    fn reject_login(&mut self, connection: ConnectionId, name: String, rejection: LoginRejection) {
        self.send(connection, &ServerMessage::LoginRejected(rejection));
        self.pending_events.push_back(ServerEvent::LoginRejected {
            connection,
            name,
            rejection,
        });
    }

    fn advance_world(&mut self, dt: f32) {
        let alive = self.roster.alive_entries();
        for id in self.world.advance(dt, &alive) {
            if self.roster.eliminate(id) {
                info!("player {} eliminated", id);
                self.pending_events
                    .push_back(ServerEvent::PlayerEliminated { id });
            }
        }

        let survivors = self.roster.alive_ids();
        if let Some(game_over) = self.world.on_game_over(&survivors) {
            self.restart_round(game_over);
        }
    }

    fn restart_round(&mut self, game_over: GameOver) {
        let message = u32::try_from(game_over.winner)
            .ok()
            .and_then(|id| self.roster.get(id))
            .map(|winner| format!("{} wins!", winner.state.name))
            .unwrap_or(game_over.message);
        info!("round over: {}", message);

        self.world.regenerate();
        let tiles = self.world.tile_snapshot();

        let mut restarts = Vec::with_capacity(self.roster.len());
        for player in self.roster.iter_mut() {
            player.alive = true;
            player.position = self.world.random_spawn_position();
            restarts.push((player.id(), player.position));
        }
        for (id, spawn) in restarts {
            self.send(
                id,
                &ServerMessage::RestartGame {
                    winner: game_over.winner,
                    tiles: tiles.clone(),
                    spawn,
                    message: message.clone(),
                },
            );
        }

        self.pending_events.push_back(ServerEvent::RoundOver {
            winner: game_over.winner,
            message,
        });
    }

    fn broadcast_state(&mut self) {
        for id in std::mem::take(&mut self.pending_left) {
            self.send_to_all(&ServerMessage::PlayerLeft { id });
        }
        if self.roster.is_empty() {
            return;
        }

        let update = ServerMessage::StateUpdate {
            alive: self.roster.alive_entries(),
        };
        match update.encode() {
            Ok(bytes) => {
                for id in self.roster.ids() {
                    self.send_bytes(id, Channel::Unreliable, &bytes);
                }
            }
            Err(e) => error!("failed to encode state update: {}", e),
        }
    }

    fn send(&mut self, connection: ConnectionId, message: &ServerMessage) {
        if let Err(e) = self.try_send(connection, message) {
            warn!("{:?} to connection {} not sent: {}", message.kind(), connection, e);
        }
    }

    fn try_send(
        &mut self,
        connection: ConnectionId,
        message: &ServerMessage,
    ) -> Result<(), SessionError> {
        let bytes = message.encode()?;
        let channel = self.config.reliable_channel;
        self.host_mut()?.send(connection, channel, &bytes)?;
        Ok(())
    }

    fn send_to_all(&mut self, message: &ServerMessage) {
        for id in self.roster.ids() {
            self.send(id, message);
        }
    }

    fn send_to_others(&mut self, except: ConnectionId, message: &ServerMessage) {
        for id in self.roster.ids() {
            if id != except {
                self.send(id, message);
            }
        }
    }

    fn send_bytes(&mut self, connection: ConnectionId, channel: Channel, bytes: &[u8]) {
        let Some(host) = self.host.as_mut() else {
            return;
        };
        if let Err(e) = host.send(connection, channel, bytes) {
            warn!("send to connection {} failed: {}", connection, e);
        }
    }
}
