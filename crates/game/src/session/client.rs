use std::collections::VecDeque;
use std::net::SocketAddr;

use glam::Vec3;
use log::{debug, error, info, warn};

use crate::net::{
    AliveEntry, Announcement, Channel, ClientMessage, Color32, ConnectionId, Host, LoginGrant,
    LoginRejection, NetEvent, NetworkStats, PlayerId, ServerMessage, find_private_port,
};

use super::collab::{UiSink, World};
use super::config::SessionConfig;
use super::error::SessionError;
use super::events::ClientEvent;
use super::registry::{PeerList, ReconcileReport, Roster};
use super::timer::Countdown;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientState {
    Idle,
    /// The discovery port is taken; try again when the countdown ends.
    Binding { retry_in: Countdown },
    /// Listening on the discovery port for an advertisement.
    Discovering,
    /// Discovery port released; waiting out the grace period before binding
    /// a private port and connecting to `server`.
    Rebinding { grace: Countdown, server: SocketAddr },
    Connecting { server: SocketAddr },
    /// Connected; a login may be submitted.
    AwaitingLogin,
    /// Logged in with a scene waiting to be loaded.
    InLobby,
    InGame,
}

/// Board and spawn point handed to the host loop for the next scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneLoad {
    pub tiles: Vec<u8>,
    pub spawn: Vec3,
}

/// One peer's view of a game session, from discovery to in-game play.
///
/// Driven by [`ClientSession::tick`] from the host loop. All waiting is
/// expressed as countdowns inside [`ClientState`].
pub struct ClientSession<U, W> {
    config: SessionConfig,
    ui: U,
    world: W,
    state: ClientState,
    host: Option<Host>,
    server: Option<ConnectionId>,
    server_addr: Option<SocketAddr>,
    local_port: Option<u16>,
    waiting_for_login_response: bool,
    local_server_started: bool,
    host_election: Countdown,
    host_election_raised: bool,
    names_refresh: Countdown,
    roster: Roster,
    peers: PeerList,
    pending_scene: Option<SceneLoad>,
    pending_events: VecDeque<ClientEvent>,
}

impl<U: UiSink, W: World> ClientSession<U, W> {
    pub fn new(config: SessionConfig, ui: U, world: W) -> Self {
        let host_election = Countdown::new(config.timers.host_election);
        let names_refresh = Countdown::new(config.timers.names_refresh);
        Self {
            config,
            ui,
            world,
            state: ClientState::Idle,
            host: None,
            server: None,
            server_addr: None,
            local_port: None,
            waiting_for_login_response: false,
            local_server_started: false,
            host_election,
            host_election_raised: false,
            names_refresh,
            roster: Roster::default(),
            peers: PeerList::new(),
            pending_scene: None,
            pending_events: VecDeque::new(),
        }
    }

    /// Begins discovery. Does nothing unless the session is idle, so only
    /// one discovery sequence can be in flight.
    pub fn start(&mut self) {
        if self.state != ClientState::Idle {
            return;
        }
        self.reset();
        self.host_election.reset(self.config.timers.host_election);
        self.host_election_raised = false;
        self.try_bind_discovery();
    }

    pub fn stop(&mut self) {
        self.disconnect_server();
        self.reset();
        self.state = ClientState::Idle;
    }

    pub fn tick(&mut self, dt: f32) -> Result<(), SessionError> {
        match &mut self.state {
            ClientState::Idle => return Ok(()),
            ClientState::Binding { retry_in } => {
                if retry_in.tick(dt) {
                    self.try_bind_discovery();
                }
            }
            ClientState::Discovering => {
                if !self.host_election_raised
                    && !self.local_server_started
                    && self.host_election.tick(dt)
                {
                    info!("no server heard; requesting host election");
                    self.host_election_raised = true;
                    self.pending_events.push_back(ClientEvent::HostElectionDue);
                }
            }
            ClientState::Rebinding { grace, server } => {
                if grace.tick(dt) {
                    let server = *server;
                    self.rebind_and_connect(server);
                }
            }
            _ => {}
        }

        self.drain_host()?;

        if matches!(self.state, ClientState::InLobby | ClientState::InGame)
            && self.names_refresh.tick(dt)
        {
            self.names_refresh.reset(self.config.timers.names_refresh);
            self.ui.set_player_names(&self.roster.names_text());
        }
        Ok(())
    }

    /// Sends LOGIN. Returns `Ok(false)` without sending anything while an
    /// earlier attempt is still waiting for its reply.
    pub fn try_joining_game(&mut self, name: &str, password: &str) -> Result<bool, SessionError> {
        if self.waiting_for_login_response {
            return Ok(false);
        }
        if self.state != ClientState::AwaitingLogin {
            return Err(SessionError::NotConnected);
        }

        let bytes = ClientMessage::Login {
            name: name.to_string(),
            password: password.to_string(),
        }
        .encode()?;
        self.send_to_server(self.config.reliable_channel, &bytes)?;
        self.waiting_for_login_response = true;
        self.ui.set_status_text("Logging in...", Color32::WHITE, true);
        Ok(true)
    }

    pub fn send_chat_message(&mut self, message: &str) -> Result<(), SessionError> {
        if !self.is_logged_in() {
            return Err(SessionError::NotConnected);
        }
        let Some(local) = self.roster.local().cloned() else {
            return Err(SessionError::NotConnected);
        };

        let bytes = ClientMessage::Chat {
            name: local.name.clone(),
            color: local.color,
            message: message.to_string(),
        }
        .encode()?;
        self.send_to_server(self.config.reliable_channel, &bytes)?;
        self.ui.process_chat_string(&local.name, local.color, message);
        Ok(())
    }

    pub fn spawn_bomb(&mut self, position: Vec3) -> Result<(), SessionError> {
        if self.state != ClientState::InGame {
            return Err(SessionError::NotConnected);
        }
        self.world.place_bomb(position, false);
        let bytes = ClientMessage::SpawnBomb { position }.encode()?;
        self.send_to_server(self.config.reliable_channel, &bytes)
    }

    pub fn send_position(&mut self, position: Vec3) -> Result<(), SessionError> {
        if self.state != ClientState::InGame {
            return Err(SessionError::NotConnected);
        }
        let bytes = ClientMessage::Position { position }.encode()?;
        self.send_to_server(Channel::Unreliable, &bytes)
    }

    pub fn pending_scene(&self) -> Option<&SceneLoad> {
        self.pending_scene.as_ref()
    }

    /// Called by the host loop once the pending scene is on screen.
    pub fn on_scene_loaded(&mut self) -> Option<SceneLoad> {
        if self.state != ClientState::InLobby {
            return None;
        }
        let scene = self.pending_scene.take()?;
        self.world.load_tiles(&scene.tiles);
        self.state = ClientState::InGame;
        info!("scene loaded, spawning at {}", scene.spawn);
        Some(scene)
    }

    /// The host loop has started a server in this process.
    pub fn mark_local_server_started(&mut self) {
        self.local_server_started = true;
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ClientEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn is_waiting_for_login_response(&self) -> bool {
        self.waiting_for_login_response
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.state, ClientState::InLobby | ClientState::InGame)
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        if self.is_logged_in() {
            self.roster.local().map(|p| p.id)
        } else {
            None
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn peers(&self) -> &PeerList {
        &self.peers
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr
    }

    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    pub fn network_stats(&self) -> Option<NetworkStats> {
        self.host.as_ref().map(|host| host.stats().clone())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut U {
        &mut self.ui
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    fn try_bind_discovery(&mut self) {
        let addr = self.config.discovery_addr();
        match Host::bind(addr, self.config.client_host_config()) {
            Ok(mut host) => {
                host.set_broadcast_credentials(self.config.discovery_filter());
                info!("listening for servers on {}", host.local_addr());
                self.host = Some(host);
                self.state = ClientState::Discovering;
                self.ui
                    .set_status_text("Searching for server...", Color32::WHITE, true);
            }
            Err(e) => {
                warn!("discovery port {} unavailable: {}", addr.port(), e);
                self.state = ClientState::Binding {
                    retry_in: Countdown::new(self.config.timers.bind_retry),
                };
                self.host_election.reset(self.config.timers.host_election);
                self.ui
                    .set_status_text("Waiting for discovery port...", Color32::YELLOW, true);
            }
        }
    }

    fn drain_host(&mut self) -> Result<(), SessionError> {
        loop {
            let Some(host) = self.host.as_mut() else {
                return Ok(());
            };
            let Some(event) = host.poll_event()? else {
                return Ok(());
            };
            self.handle_net_event(event);
        }
    }

    fn handle_net_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Broadcast { from } => self.handle_broadcast(from),
            NetEvent::Connect(id) => {
                if Some(id) != self.server {
                    return;
                }
                if let ClientState::Connecting { server } = self.state {
                    info!("connected to {}", server);
                    self.state = ClientState::AwaitingLogin;
                    self.ui
                        .set_status_text("Connected! Please log in.", Color32::WHITE, false);
                    self.pending_events.push_back(ClientEvent::Connected {
                        server,
                        local_port: self.local_port.unwrap_or_default(),
                    });
                }
            }
            NetEvent::Disconnect(id) => {
                if Some(id) != self.server {
                    return;
                }
                let reason = if matches!(self.state, ClientState::Connecting { .. }) {
                    "Could not reach server!"
                } else {
                    "Disconnected from server!"
                };
                self.server = None;
                self.return_to_menu(reason);
            }
            NetEvent::Data(id, bytes) => {
                if Some(id) == self.server {
                    self.handle_data(&bytes);
                }
            }
        }
    }

    fn handle_broadcast(&mut self, from: SocketAddr) {
        if self.state != ClientState::Discovering || self.server.is_some() {
            return;
        }

        if let Some(host) = &self.host {
            match host.broadcast_message().map(Announcement::decode) {
                Some(Ok(announcement)) => {
                    debug!("advertisement from {}: {}", from, announcement.text)
                }
                Some(Err(e)) => warn!("unreadable advertisement from {}: {}", from, e),
                None => {}
            }
        }

        let text = if self.local_server_started {
            "Created Server!"
        } else {
            "Found Server!"
        };
        info!("{} ({})", text, from);
        self.ui.set_status_text(text, Color32::YELLOW, false);
        self.pending_events
            .push_back(ClientEvent::ServerFound { addr: from });

        // Free the discovery port for other peers on this machine.
        self.host = None;
        self.state = ClientState::Rebinding {
            grace: Countdown::new(self.config.timers.reconnect_grace),
            server: from,
        };
    }

    fn rebind_and_connect(&mut self, server: SocketAddr) {
        let bind_ip = self.config.bind_addr;
        let host_config = self.config.client_host_config();
        let found = find_private_port(self.config.discovery_port(), |port| {
            Host::bind((bind_ip, port), host_config.clone())
        });

        let (port, mut host) = match found {
            Ok(bound) => bound,
            Err(e) => {
                error!("{}", e);
                self.return_to_menu("No free port to connect from!");
                return;
            }
        };

        match host.connect(server) {
            Ok(id) => {
                info!("connecting to {} from port {}", server, port);
                self.host = Some(host);
                self.server = Some(id);
                self.server_addr = Some(server);
                self.local_port = Some(port);
                self.state = ClientState::Connecting { server };
                self.ui.set_status_text("Connecting...", Color32::WHITE, true);
            }
            Err(e) => {
                error!("connect to {} failed: {}", server, e);
                self.return_to_menu("Could not connect to server!");
            }
        }
    }

    fn handle_data(&mut self, bytes: &[u8]) {
        let message = match ServerMessage::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                error!("protocol error from server: {}", e);
                return;
            }
        };

        match message {
            ServerMessage::LoginAccepted(grant) => self.handle_login_accepted(grant),
            ServerMessage::LoginRejected(rejection) => self.handle_login_rejected(rejection),
            ServerMessage::StateUpdate { alive } => self.handle_state_update(&alive),
            ServerMessage::SpawnBomb { position } => {
                if self.state == ClientState::InGame {
                    self.world.place_bomb(position, true);
                }
            }
            ServerMessage::RestartGame {
                winner,
                tiles,
                spawn,
                message,
            } => self.handle_restart(winner, SceneLoad { tiles, spawn }, message),
            ServerMessage::PlayerJoin(player) => {
                if !self.is_logged_in() {
                    return;
                }
                let (id, name) = (player.id, player.name.clone());
                if self.roster.add(player) {
                    info!("{} joined", name);
                    self.pending_events
                        .push_back(ClientEvent::PlayerJoined { id, name });
                }
            }
            ServerMessage::PlayerLeft { id } => {
                if Some(id) == self.local_id() {
                    return;
                }
                if let Some(player) = self.roster.remove_by_id(id) {
                    info!("{} left", player.name);
                    self.pending_events.push_back(ClientEvent::PlayerLeft { id });
                }
            }
            ServerMessage::Chat {
                name,
                color,
                message,
            } => {
                self.ui.process_chat_string(&name, color, &message);
                self.pending_events
                    .push_back(ClientEvent::Chat { name, message });
            }
        }
    }

    fn handle_login_accepted(&mut self, grant: LoginGrant) {
        if !self.waiting_for_login_response || self.state != ClientState::AwaitingLogin {
            warn!("unexpected login reply ignored");
            return;
        }
        self.waiting_for_login_response = false;

        let id = grant.player.id;
        info!("logged in as {} (player {})", grant.player.name, id);
        self.roster = Roster::from_login(grant.player, grant.peers);
        self.peers.clear();
        self.pending_scene = Some(SceneLoad {
            tiles: grant.tiles,
            spawn: grant.spawn,
        });
        self.state = ClientState::InLobby;

        self.ui.set_status_text("Logged in!", Color32::WHITE, false);
        self.ui.set_player_names(&self.roster.names_text());
        self.names_refresh.reset(self.config.timers.names_refresh);

        self.pending_events.push_back(ClientEvent::LoginAccepted { id });
        self.pending_events.push_back(ClientEvent::SceneLoadReady);
    }

    fn handle_login_rejected(&mut self, rejection: LoginRejection) {
        if !self.waiting_for_login_response {
            warn!("unexpected login rejection ignored");
            return;
        }
        self.waiting_for_login_response = false;

        let text = match rejection {
            LoginRejection::InvalidCredentials => "Invalid login info!",
            LoginRejection::AlreadyLoggedIn => "Already logged in!",
        };
        warn!("login rejected: {}", text);
        self.ui.set_status_text(text, Color32::RED, false);
        self.pending_events
            .push_back(ClientEvent::LoginRejected(rejection));
    }

    fn handle_state_update(&mut self, alive: &[AliveEntry]) {
        if self.state != ClientState::InGame {
            return;
        }
        let report = self.peers.reconcile(self.local_id(), alive);
        if report.has_membership_changes() {
            debug!(
                "peers created {:?}, destroyed {:?}",
                report.created, report.destroyed
            );
            self.pending_events.push_back(ClientEvent::PeersChanged(report));
        }
    }

    fn handle_restart(&mut self, winner: i32, scene: SceneLoad, message: String) {
        if !self.is_logged_in() {
            return;
        }

        let destroyed = self.peers.retain_winner(winner);
        if !destroyed.is_empty() {
            self.pending_events
                .push_back(ClientEvent::PeersChanged(ReconcileReport {
                    destroyed,
                    ..Default::default()
                }));
        }
        self.pending_scene = Some(scene);
        self.state = ClientState::InLobby;

        info!("round over: {}", message);
        self.ui.fade_out_with_text(&message);
        self.pending_events
            .push_back(ClientEvent::RoundRestarted { winner, message });
        self.pending_events.push_back(ClientEvent::SceneLoadReady);
    }

    fn send_to_server(&mut self, channel: Channel, bytes: &[u8]) -> Result<(), SessionError> {
        let (Some(host), Some(server)) = (self.host.as_mut(), self.server) else {
            return Err(SessionError::NotConnected);
        };
        host.send(server, channel, bytes)?;
        Ok(())
    }

    fn disconnect_server(&mut self) {
        if let (Some(host), Some(server)) = (self.host.as_mut(), self.server) {
            host.disconnect(server);
        }
    }

    fn return_to_menu(&mut self, reason: &str) {
        warn!("returning to menu: {}", reason);
        self.disconnect_server();
        self.reset();
        self.state = ClientState::Idle;
        self.ui.set_status_text(reason, Color32::RED, false);
        self.pending_events.push_back(ClientEvent::ReturnedToMenu {
            reason: reason.to_string(),
        });
    }

    fn reset(&mut self) {
        self.host = None;
        self.server = None;
        self.server_addr = None;
        self.local_port = None;
        self.waiting_for_login_response = false;
        self.roster.clear();
        self.peers.clear();
        self.pending_scene = None;
    }
}
