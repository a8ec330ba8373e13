use std::collections::VecDeque;

use crossterm::event::{KeyCode, KeyModifiers};
use glam::Vec3;
use log::{debug, error, info, warn};

use bomberlan::world::{Tile, TileWorld};
use bomberlan::{
    ClientEvent, ClientSession, ClientState, MemoryCredentialStore, ServerSession, SessionConfig,
    SessionError, World,
};

use crate::console::ConsoleUi;

const MAX_EVENT_LINES: usize = 8;
const MAX_INPUT_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Name,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Back at the menu after a failed or dropped session.
    Menu,
    Login(LoginField),
    Play,
    Chat,
}

pub struct App {
    session: ClientSession<ConsoleUi, TileWorld>,
    /// Started when no server answered discovery.
    local_server: Option<ServerSession<TileWorld, MemoryCredentialStore>>,
    mode: InputMode,
    name: String,
    password: String,
    chat_input: String,
    auto_login: bool,
    auto_login_pending: bool,
    position: Vec3,
    events: VecDeque<String>,
    should_quit: bool,
}

impl App {
    pub fn new(config: SessionConfig, name: String, password: String, auto_login: bool) -> Self {
        Self {
            session: ClientSession::new(config, ConsoleUi::new(), TileWorld::new()),
            local_server: None,
            mode: InputMode::Login(LoginField::Name),
            name,
            password,
            chat_input: String::new(),
            auto_login,
            auto_login_pending: false,
            position: Vec3::ZERO,
            events: VecDeque::new(),
            should_quit: false,
        }
    }

    pub fn start(&mut self) {
        self.session.start();
        if *self.session.state() != ClientState::Idle && self.mode == InputMode::Menu {
            self.mode = InputMode::Login(LoginField::Name);
        }
    }

    pub fn shutdown(&mut self) {
        self.session.stop();
        if let Some(server) = &mut self.local_server {
            server.stop();
        }
    }

    pub fn tick(&mut self, dt: f32) -> Result<(), SessionError> {
        if let Some(server) = &mut self.local_server {
            if server.is_running() {
                if let Err(e) = server.tick(dt) {
                    error!("local server failed: {}", e);
                    server.stop();
                }
                for event in server.drain_events() {
                    debug!("local server: {:?}", event);
                }
            }
        }

        self.session.tick(dt)?;
        let events: Vec<ClientEvent> = self.session.drain_events().collect();
        for event in events {
            self.handle_event(event);
        }

        if *self.session.state() == ClientState::InGame {
            self.session.world_mut().advance(dt, &[]);
        }
        self.session.ui_mut().update(dt);

        if self.auto_login_pending && *self.session.state() == ClientState::AwaitingLogin {
            self.auto_login_pending = false;
            self.submit_login();
        }
        Ok(())
    }

    fn handle_event(&mut self, event: ClientEvent) {
        self.push_event(event.describe());
        match event {
            ClientEvent::HostElectionDue => self.host_local_server(),
            ClientEvent::Connected { .. } => {
                self.mode = InputMode::Login(LoginField::Name);
                self.auto_login_pending = self.auto_login;
            }
            ClientEvent::LoginAccepted { .. } => self.mode = InputMode::Play,
            ClientEvent::SceneLoadReady => {
                if let Some(scene) = self.session.on_scene_loaded() {
                    self.position = scene.spawn;
                    if let Err(e) = self.session.send_position(self.position) {
                        warn!("could not report spawn: {}", e);
                    }
                }
            }
            ClientEvent::ReturnedToMenu { .. } => {
                self.mode = InputMode::Menu;
                self.chat_input.clear();
            }
            _ => {}
        }
    }

    fn host_local_server(&mut self) {
        let config = self.session.config().clone();
        let mut server = ServerSession::new(config, TileWorld::new(), MemoryCredentialStore::new());
        match server.start() {
            Ok(()) => {
                info!("hosting a local server");
                self.session.mark_local_server_started();
                self.local_server = Some(server);
            }
            Err(e) => {
                warn!("could not host a server: {}", e);
                self.push_event(format!("could not host: {}", e));
            }
        }
    }

    fn submit_login(&mut self) {
        match self.session.try_joining_game(&self.name, &self.password) {
            Ok(true) => {}
            Ok(false) => debug!("login already in flight"),
            Err(e) => self.push_event(format!("cannot log in yet: {}", e)),
        }
    }

    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match self.mode {
            InputMode::Menu => match code {
                KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                KeyCode::Char('r') => self.start(),
                _ => {}
            },
            InputMode::Login(field) => match code {
                KeyCode::Esc => self.should_quit = true,
                KeyCode::Tab | KeyCode::BackTab => {
                    self.mode = InputMode::Login(match field {
                        LoginField::Name => LoginField::Password,
                        LoginField::Password => LoginField::Name,
                    });
                }
                KeyCode::Enter => self.submit_login(),
                KeyCode::Backspace => {
                    self.login_field_mut(field).pop();
                }
                KeyCode::Char(c) => {
                    let input = self.login_field_mut(field);
                    if input.len() < MAX_INPUT_LEN {
                        input.push(c);
                    }
                }
                _ => {}
            },
            InputMode::Play => match code {
                KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                KeyCode::Up | KeyCode::Char('w') => self.move_player(0, -1),
                KeyCode::Down | KeyCode::Char('s') => self.move_player(0, 1),
                KeyCode::Left | KeyCode::Char('a') => self.move_player(-1, 0),
                KeyCode::Right | KeyCode::Char('d') => self.move_player(1, 0),
                KeyCode::Char(' ') => {
                    if let Err(e) = self.session.spawn_bomb(self.position) {
                        debug!("bomb not placed: {}", e);
                    }
                }
                KeyCode::Enter | KeyCode::Char('t') => self.mode = InputMode::Chat,
                _ => {}
            },
            InputMode::Chat => match code {
                KeyCode::Esc => {
                    self.chat_input.clear();
                    self.mode = InputMode::Play;
                }
                KeyCode::Enter => {
                    let message = std::mem::take(&mut self.chat_input);
                    if !message.trim().is_empty() {
                        if let Err(e) = self.session.send_chat_message(message.trim()) {
                            self.push_event(format!("chat not sent: {}", e));
                        }
                    }
                    self.mode = InputMode::Play;
                }
                KeyCode::Backspace => {
                    self.chat_input.pop();
                }
                KeyCode::Char(c) => {
                    if self.chat_input.len() < MAX_INPUT_LEN {
                        self.chat_input.push(c);
                    }
                }
                _ => {}
            },
        }
    }

    fn login_field_mut(&mut self, field: LoginField) -> &mut String {
        match field {
            LoginField::Name => &mut self.name,
            LoginField::Password => &mut self.password,
        }
    }

    fn move_player(&mut self, dx: i32, dy: i32) {
        if *self.session.state() != ClientState::InGame {
            return;
        }
        let Some(target) = step_target(self.session.world(), self.position, dx, dy) else {
            return;
        };
        self.position = target;
        if let Err(e) = self.session.send_position(target) {
            warn!("position not sent: {}", e);
        }
    }

    fn push_event(&mut self, line: String) {
        if self.events.len() == MAX_EVENT_LINES {
            self.events.pop_front();
        }
        self.events.push_back(line);
    }

    pub fn session(&self) -> &ClientSession<ConsoleUi, TileWorld> {
        &self.session
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn chat_input(&self) -> &str {
        &self.chat_input
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn events(&self) -> impl Iterator<Item = &String> {
        self.events.iter()
    }

    pub fn is_hosting(&self) -> bool {
        self.local_server
            .as_ref()
            .is_some_and(|server| server.is_running())
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }
}

/// Neighbouring tile centre if it can be walked onto.
fn step_target(world: &TileWorld, position: Vec3, dx: i32, dy: i32) -> Option<Vec3> {
    let (x, y) = TileWorld::tile_at(position)?;
    let x = x.checked_add_signed(dx as isize)?;
    let y = y.checked_add_signed(dy as isize)?;
    match world.tile(x, y)? {
        Tile::Ground => Some(TileWorld::tile_center(x, y)),
        _ => None,
    }
}
