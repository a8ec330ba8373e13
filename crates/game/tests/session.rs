use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use bomberlan::net::MAX_FRAME_SIZE;
use bomberlan::session::ClientTimers;
use bomberlan::{
    AliveEntry, Channel, ClientEvent, ClientMessage, ClientSession, ClientState, Color32,
    CredentialStore, GameOver, Host, HostConfig, LoginRejection, MAX_NAME_LEN,
    MemoryCredentialStore, NetEvent, PlayerId, ServerEvent, ServerMessage, ServerSession,
    SessionConfig, SessionError, UiSink, World,
};
use glam::Vec3;

static PORT_COUNTER: AtomicU16 = AtomicU16::new(41000);

const DT: f32 = 0.01;
const TIMEOUT: Duration = Duration::from_secs(5);
const BOARD: [u8; 6] = [1, 1, 0, 2, 0, 1];

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(40, Ordering::SeqCst)
}

fn localhost() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn test_config(port: u16) -> SessionConfig {
    SessionConfig {
        port,
        bind_addr: localhost(),
        broadcast_addr: localhost(),
        broadcast_interval: Duration::from_millis(50),
        state_interval: 0.02,
        timers: ClientTimers {
            bind_retry: 0.1,
            reconnect_grace: 0.05,
            host_election: 0.5,
            names_refresh: 0.1,
        },
        ..Default::default()
    }
}

#[derive(Debug, Default)]
struct RecordingUi {
    statuses: Vec<String>,
    names: String,
    chat: Vec<(String, String)>,
    fades: Vec<String>,
}

impl UiSink for RecordingUi {
    fn set_status_text(&mut self, text: &str, _color: Color32, _animated: bool) {
        self.statuses.push(text.to_string());
    }

    fn set_player_names(&mut self, names: &str) {
        self.names = names.to_string();
    }

    fn process_chat_string(&mut self, name: &str, _color: Color32, message: &str) {
        self.chat.push((name.to_string(), message.to_string()));
    }

    fn fade_out_with_text(&mut self, message: &str) {
        self.fades.push(message.to_string());
    }
}

#[derive(Debug, Default)]
struct ScriptedWorld {
    tiles: Vec<u8>,
    loaded: Vec<Vec<u8>>,
    bombs: Vec<(Vec3, bool)>,
    game_over: Option<GameOver>,
    regenerations: usize,
}

impl World for ScriptedWorld {
    fn tile_snapshot(&self) -> Vec<u8> {
        self.tiles.clone()
    }

    fn load_tiles(&mut self, tiles: &[u8]) {
        self.loaded.push(tiles.to_vec());
    }

    fn random_spawn_position(&mut self) -> Vec3 {
        Vec3::new(2.0, 0.0, 2.0)
    }

    fn place_bomb(&mut self, position: Vec3, remote_origin: bool) {
        self.bombs.push((position, remote_origin));
    }

    fn advance(&mut self, _dt: f32, _players: &[AliveEntry]) -> Vec<PlayerId> {
        Vec::new()
    }

    fn on_game_over(&mut self, _survivors: &[PlayerId]) -> Option<GameOver> {
        self.game_over.take()
    }

    fn regenerate(&mut self) {
        self.regenerations += 1;
    }
}

type TestServer = ServerSession<ScriptedWorld, MemoryCredentialStore>;
type TestClient = ClientSession<RecordingUi, ScriptedWorld>;

struct Lan {
    config: SessionConfig,
    server: TestServer,
    server_events: Vec<ServerEvent>,
    clients: Vec<TestClient>,
    client_events: Vec<Vec<ClientEvent>>,
}

impl Lan {
    fn new(credentials: MemoryCredentialStore) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = test_config(next_port());
        let world = ScriptedWorld {
            tiles: BOARD.to_vec(),
            ..Default::default()
        };
        let mut server = ServerSession::new(config.clone(), world, credentials);
        server.start().unwrap();

        Self {
            config,
            server,
            server_events: Vec::new(),
            clients: Vec::new(),
            client_events: Vec::new(),
        }
    }

    fn add_client_with(&mut self, config: SessionConfig) -> usize {
        let mut client =
            ClientSession::new(config, RecordingUi::default(), ScriptedWorld::default());
        client.start();
        self.clients.push(client);
        self.client_events.push(Vec::new());
        self.clients.len() - 1
    }

    fn add_client(&mut self) -> usize {
        self.add_client_with(self.config.clone())
    }

    fn step(&mut self) {
        if self.server.is_running() {
            self.server.tick(DT).unwrap();
            self.server_events.extend(self.server.drain_events());
        }
        for (index, client) in self.clients.iter_mut().enumerate() {
            client.tick(DT).unwrap();
            self.client_events[index].extend(client.drain_events());
        }
    }

    fn run_until(&mut self, condition: impl Fn(&Lan) -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < TIMEOUT {
            self.step();
            if condition(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn run_for(&mut self, duration: Duration) {
        let start = Instant::now();
        while start.elapsed() < duration {
            self.step();
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn connect(&mut self, index: usize) {
        assert!(
            self.run_until(|lan| *lan.clients[index].state() == ClientState::AwaitingLogin),
            "client {} never connected: {:?}",
            index,
            self.clients[index].state()
        );
    }

    fn login(&mut self, index: usize, name: &str, password: &str) -> PlayerId {
        self.connect(index);
        assert!(self.clients[index].try_joining_game(name, password).unwrap());
        assert!(
            self.run_until(|lan| *lan.clients[index].state() == ClientState::InLobby),
            "login for {} never completed",
            name
        );
        self.clients[index].on_scene_loaded().unwrap();
        self.clients[index].local_id().unwrap()
    }
}

#[test]
fn test_discovery_connect_and_login() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let a = lan.add_client();
    lan.connect(a);

    let port = lan.clients[a].local_port().unwrap();
    let discovery = lan.config.discovery_port();
    assert!((discovery - 17..discovery).contains(&port), "port {}", port);
    assert_eq!(
        lan.clients[a].server_addr(),
        Some(SocketAddr::new(localhost(), lan.config.port))
    );
    assert!(lan.clients[a].ui().statuses.iter().any(|s| s == "Found Server!"));

    let sent_before = lan.clients[a].network_stats().unwrap().packets_sent;
    assert!(lan.clients[a].try_joining_game("ann", "pw").unwrap());
    let sent_after_first = lan.clients[a].network_stats().unwrap().packets_sent;
    assert!(!lan.clients[a].try_joining_game("ann", "pw").unwrap());
    assert!(lan.clients[a].is_waiting_for_login_response());
    assert_eq!(sent_after_first, sent_before + 1);
    assert_eq!(
        lan.clients[a].network_stats().unwrap().packets_sent,
        sent_after_first
    );

    assert!(lan.run_until(|lan| *lan.clients[a].state() == ClientState::InLobby));
    assert!(!lan.clients[a].is_waiting_for_login_response());
    assert_eq!(lan.clients[a].pending_scene().unwrap().tiles, BOARD.to_vec());
    assert_eq!(lan.clients[a].roster().local().unwrap().name, "ann");
    assert!(lan.clients[a].ui().names.contains("ann"));

    let scene = lan.clients[a].on_scene_loaded().unwrap();
    assert_eq!(scene.spawn, Vec3::new(2.0, 0.0, 2.0));
    assert_eq!(*lan.clients[a].state(), ClientState::InGame);
    assert_eq!(lan.clients[a].world().loaded, vec![BOARD.to_vec()]);
    assert!(lan.server_events.iter().any(|e| matches!(
        e,
        ServerEvent::LoginAccepted { name, registered: true, .. } if name == "ann"
    )));
}

#[test]
fn test_second_client_waits_for_discovery_port() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let a = lan.add_client();
    let b = lan.add_client();
    assert!(matches!(lan.clients[b].state(), ClientState::Binding { .. }));

    lan.connect(a);
    lan.connect(b);
    assert_ne!(lan.clients[a].local_port(), lan.clients[b].local_port());
}

#[test]
fn test_peers_appear_and_leave() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let a = lan.add_client();
    let b = lan.add_client();
    let a_id = lan.login(a, "ann", "pw");
    let b_id = lan.login(b, "bob", "pw");

    assert!(lan.run_until(|lan| {
        lan.clients[a].peers().ids() == vec![b_id]
            && lan.clients[b].peers().ids() == vec![a_id]
            && lan.clients[a].roster().len() == 2
    }));
    assert_eq!(lan.clients[b].roster().local().unwrap().id, b_id);
    assert_eq!(lan.clients[b].roster().names_text(), "bob\nann");

    lan.clients[a]
        .send_position(Vec3::new(6.0, 0.0, 4.0))
        .unwrap();
    assert!(lan.run_until(|lan| {
        lan.clients[b]
            .peers()
            .get(a_id)
            .is_some_and(|p| p.position == Vec3::new(6.0, 0.0, 4.0))
    }));

    lan.clients[b].stop();
    assert!(lan.run_until(|lan| {
        lan.clients[a].roster().len() == 1 && lan.clients[a].peers().is_empty()
    }));
    assert!(
        lan.client_events[a]
            .iter()
            .any(|e| *e == ClientEvent::PlayerLeft { id: b_id })
    );
    assert!(lan.server_events.iter().any(|e| matches!(
        e,
        ServerEvent::ClientDisconnected { name: Some(name), .. } if name == "bob"
    )));
}

#[test]
fn test_duplicate_name_is_rejected_and_retry_allowed() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let a = lan.add_client();
    let b = lan.add_client();
    lan.login(a, "ann", "pw");

    lan.connect(b);
    assert!(lan.clients[b].try_joining_game("ann", "pw").unwrap());
    assert!(lan.run_until(|lan| !lan.clients[b].is_waiting_for_login_response()));
    assert_eq!(*lan.clients[b].state(), ClientState::AwaitingLogin);
    assert_eq!(
        lan.clients[b].ui().statuses.last().map(String::as_str),
        Some("Already logged in!")
    );
    assert!(
        lan.client_events[b]
            .contains(&ClientEvent::LoginRejected(LoginRejection::AlreadyLoggedIn))
    );

    assert!(lan.clients[b].try_joining_game("bob", "pw").unwrap());
    assert!(lan.run_until(|lan| *lan.clients[b].state() == ClientState::InLobby));
}

#[test]
fn test_wrong_password_for_online_name_is_invalid() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let a = lan.add_client();
    let b = lan.add_client();
    lan.login(a, "ann", "pw");

    lan.connect(b);
    assert!(lan.clients[b].try_joining_game("ann", "WRONG").unwrap());
    assert!(lan.run_until(|lan| !lan.clients[b].is_waiting_for_login_response()));
    assert_eq!(*lan.clients[b].state(), ClientState::AwaitingLogin);
    assert_eq!(
        lan.clients[b].ui().statuses.last().map(String::as_str),
        Some("Invalid login info!")
    );
    assert!(
        lan.client_events[b]
            .contains(&ClientEvent::LoginRejected(LoginRejection::InvalidCredentials))
    );
    assert_eq!(lan.server.roster().len(), 1);
}

#[test]
fn test_overlong_name_is_rejected() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let a = lan.add_client();
    let b = lan.add_client();
    let c = lan.add_client();
    lan.connect(a);

    let overlong = "x".repeat(2040);
    assert!(lan.clients[a].try_joining_game(&overlong, "pw").unwrap());
    assert!(lan.run_until(|lan| !lan.clients[a].is_waiting_for_login_response()));
    assert_eq!(*lan.clients[a].state(), ClientState::AwaitingLogin);
    assert_eq!(
        lan.clients[a].ui().statuses.last().map(String::as_str),
        Some("Invalid login info!")
    );
    assert!(lan.server_events.iter().any(|e| matches!(
        e,
        ServerEvent::LoginRejected { rejection: LoginRejection::InvalidCredentials, .. }
    )));
    assert!(lan.server.roster().is_empty());

    let a_id = lan.login(a, &"a".repeat(MAX_NAME_LEN), "pw");
    let b_id = lan.login(b, &"b".repeat(MAX_NAME_LEN), "pw");
    lan.login(c, "bob", "pw");
    assert!(lan.run_until(|lan| lan.clients[c].peers().ids() == vec![a_id, b_id]));
    assert_eq!(lan.clients[c].roster().len(), 3);
}

#[test]
fn test_oversized_login_reply_becomes_rejection() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    lan.server.world_mut().tiles = vec![0; MAX_FRAME_SIZE];
    let a = lan.add_client();
    lan.connect(a);

    assert!(lan.clients[a].try_joining_game("ann", "pw").unwrap());
    assert!(lan.run_until(|lan| !lan.clients[a].is_waiting_for_login_response()));
    assert_eq!(*lan.clients[a].state(), ClientState::AwaitingLogin);
    assert!(
        lan.client_events[a]
            .contains(&ClientEvent::LoginRejected(LoginRejection::InvalidCredentials))
    );
    assert!(lan.server.roster().is_empty());

    lan.server.world_mut().tiles = BOARD.to_vec();
    assert!(lan.clients[a].try_joining_game("ann", "other").unwrap());
    assert!(lan.run_until(|lan| *lan.clients[a].state() == ClientState::InLobby));
    assert!(lan.server_events.iter().any(|e| matches!(
        e,
        ServerEvent::LoginAccepted { name, registered: true, .. } if name == "ann"
    )));
}

#[test]
fn test_wrong_password_is_rejected() {
    let mut credentials = MemoryCredentialStore::new();
    credentials.store("ann", "secret");
    let mut lan = Lan::new(credentials);
    let a = lan.add_client();
    lan.connect(a);

    assert!(lan.clients[a].try_joining_game("ann", "guess").unwrap());
    assert!(lan.run_until(|lan| !lan.clients[a].is_waiting_for_login_response()));
    assert_eq!(*lan.clients[a].state(), ClientState::AwaitingLogin);
    assert!(lan.clients[a].pending_scene().is_none());
    assert_eq!(
        lan.clients[a].ui().statuses.last().map(String::as_str),
        Some("Invalid login info!")
    );

    assert!(lan.clients[a].try_joining_game("ann", "secret").unwrap());
    assert!(lan.run_until(|lan| *lan.clients[a].state() == ClientState::InLobby));
    assert!(lan.server_events.iter().any(|e| matches!(
        e,
        ServerEvent::LoginAccepted { registered: false, .. }
    )));
}

#[test]
fn test_replayed_login_and_malformed_packet() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let mut raw = Host::bind("127.0.0.1:0", HostConfig::default()).unwrap();
    let server_addr = SocketAddr::new(localhost(), lan.config.port);
    let link = raw.connect(server_addr).unwrap();

    let mut received = Vec::new();
    let mut connected = false;
    let mut pump = |lan: &mut Lan, raw: &mut Host, received: &mut Vec<ServerMessage>| {
        lan.step();
        while let Some(event) = raw.poll_event().unwrap() {
            match event {
                NetEvent::Connect(_) => connected = true,
                NetEvent::Data(_, bytes) => received.push(ServerMessage::decode(&bytes).unwrap()),
                _ => {}
            }
        }
        thread::sleep(Duration::from_millis(5));
        connected
    };

    let start = Instant::now();
    while !pump(&mut lan, &mut raw, &mut received) {
        assert!(start.elapsed() < TIMEOUT, "raw peer never connected");
    }

    let login = ClientMessage::Login {
        name: "ann".into(),
        password: "pw".into(),
    }
    .encode()
    .unwrap();
    raw.send(link, Channel::Reliable, &[200]).unwrap();
    raw.send(link, Channel::Reliable, &login).unwrap();
    raw.send(link, Channel::Reliable, &login).unwrap();

    let start = Instant::now();
    while received
        .iter()
        .filter(|m| matches!(m, ServerMessage::LoginAccepted(_) | ServerMessage::LoginRejected(_)))
        .count()
        < 2
    {
        assert!(start.elapsed() < TIMEOUT, "login replies missing");
        pump(&mut lan, &mut raw, &mut received);
    }

    let replies: Vec<&ServerMessage> = received
        .iter()
        .filter(|m| matches!(m, ServerMessage::LoginAccepted(_) | ServerMessage::LoginRejected(_)))
        .collect();
    match replies[0] {
        ServerMessage::LoginAccepted(grant) => {
            assert_eq!(grant.player.name, "ann");
            assert_eq!(grant.tiles, BOARD.to_vec());
            assert!(grant.peers.is_empty());
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
    assert_eq!(
        *replies[1],
        ServerMessage::LoginRejected(LoginRejection::AlreadyLoggedIn)
    );
    assert!(
        lan.server_events
            .iter()
            .any(|e| matches!(e, ServerEvent::ProtocolError { .. }))
    );
    assert_eq!(lan.server.roster().len(), 1);
}

#[test]
fn test_restart_keeps_only_winner() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let a = lan.add_client();
    let b = lan.add_client();
    let a_id = lan.login(a, "ann", "pw");
    let b_id = lan.login(b, "bob", "pw");
    assert!(lan.run_until(|lan| lan.clients[b].peers().ids() == vec![a_id]));

    lan.server.world_mut().game_over = Some(GameOver {
        winner: a_id as i32,
        message: String::from("unused"),
    });
    assert!(lan.run_until(|lan| {
        lan.clients.iter().all(|c| *c.state() == ClientState::InLobby)
    }));

    assert_eq!(lan.clients[b].peers().ids(), vec![a_id]);
    assert!(lan.clients[a].peers().is_empty());
    assert_eq!(lan.clients[b].ui().fades, vec![String::from("ann wins!")]);
    assert_eq!(lan.server.world().regenerations, 1);
    assert!(lan.client_events[b].iter().any(|e| matches!(
        e,
        ClientEvent::RoundRestarted { winner, .. } if *winner == a_id as i32
    )));

    lan.clients[b].on_scene_loaded().unwrap();
    assert!(lan.run_until(|lan| lan.clients[b].peers().ids() == vec![a_id]));
    assert!(lan.server.roster().get(b_id).unwrap().alive);
}

#[test]
fn test_chat_and_bombs_are_relayed() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let a = lan.add_client();
    let b = lan.add_client();
    lan.login(a, "ann", "pw");
    lan.login(b, "bob", "pw");

    lan.clients[a].send_chat_message("hello").unwrap();
    let bomb = Vec3::new(4.0, 0.0, 2.0);
    lan.clients[a].spawn_bomb(bomb).unwrap();

    assert!(lan.run_until(|lan| {
        !lan.clients[b].ui().chat.is_empty() && !lan.clients[b].world().bombs.is_empty()
    }));
    let expected_chat = (String::from("ann"), String::from("hello"));
    assert_eq!(lan.clients[b].ui().chat, vec![expected_chat.clone()]);
    assert_eq!(lan.clients[a].ui().chat, vec![expected_chat]);
    assert_eq!(lan.clients[a].world().bombs, vec![(bomb, false)]);
    assert_eq!(lan.clients[b].world().bombs, vec![(bomb, true)]);
    assert_eq!(lan.server.world().bombs, vec![(bomb, true)]);
}

#[test]
fn test_mismatched_filter_never_sees_server() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let mut other = lan.config.clone();
    other.discovery_key += 1;
    let a = lan.add_client_with(other);

    lan.run_for(Duration::from_millis(600));
    assert_eq!(*lan.clients[a].state(), ClientState::Discovering);
    assert!(
        !lan.client_events[a]
            .iter()
            .any(|e| matches!(e, ClientEvent::ServerFound { .. }))
    );
    assert_eq!(
        lan.client_events[a]
            .iter()
            .filter(|e| **e == ClientEvent::HostElectionDue)
            .count(),
        1
    );
}

#[test]
fn test_exhausted_ports_return_to_menu() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let discovery = lan.config.discovery_port();
    let _blockers: Vec<UdpSocket> = (discovery - 17..discovery)
        .map(|port| UdpSocket::bind((localhost(), port)).unwrap())
        .collect();

    let a = lan.add_client();
    assert!(lan.run_until(|lan| {
        lan.client_events[a]
            .iter()
            .any(|e| matches!(e, ClientEvent::ReturnedToMenu { .. }))
    }));
    assert_eq!(*lan.clients[a].state(), ClientState::Idle);
    assert_eq!(
        lan.clients[a].ui().statuses.last().map(String::as_str),
        Some("No free port to connect from!")
    );
}

#[test]
fn test_server_shutdown_returns_client_to_menu() {
    let mut lan = Lan::new(MemoryCredentialStore::new());
    let a = lan.add_client();
    lan.login(a, "ann", "pw");

    lan.server.stop();
    assert!(lan.run_until(|lan| *lan.clients[a].state() == ClientState::Idle));
    assert_eq!(
        lan.clients[a].ui().statuses.last().map(String::as_str),
        Some("Disconnected from server!")
    );
    assert!(matches!(lan.server.tick(DT), Err(SessionError::NotRunning)));
}

#[test]
fn test_unreachable_broadcast_target_fails_start() {
    let mut config = test_config(next_port());
    config.broadcast_addr = "::1".parse().unwrap();
    let mut server = ServerSession::new(
        config,
        ScriptedWorld::default(),
        MemoryCredentialStore::new(),
    );
    assert!(matches!(server.start(), Err(SessionError::DiscoveryStart(_))));
    assert!(!server.is_running());
}
