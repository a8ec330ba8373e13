use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::codec::{CodecError, Color32, PacketReader, PacketWriter};

pub const DEFAULT_PORT: u16 = 8888;
pub const DISCOVERY_KEY: u32 = 420;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_SUBVERSION: u32 = 0;
pub const DEFAULT_MAX_CONNECTIONS: usize = 4;
/// Longest player name the server accepts, in bytes.
pub const MAX_NAME_LEN: usize = 64;

pub const LOGIN_INVALID_CREDENTIALS: i32 = -1;
pub const LOGIN_ALREADY_AUTHENTICATED: i32 = -2;

pub type PlayerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Login = 0,
    StateUpdate = 1,
    SpawnBomb = 2,
    RestartGame = 3,
    PlayerJoin = 4,
    PlayerLeft = 5,
    ChatMessage = 6,
    Message = 7,
}

impl TryFrom<u8> for PacketKind {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => PacketKind::Login,
            1 => PacketKind::StateUpdate,
            2 => PacketKind::SpawnBomb,
            3 => PacketKind::RestartGame,
            4 => PacketKind::PlayerJoin,
            5 => PacketKind::PlayerLeft,
            6 => PacketKind::ChatMessage,
            7 => PacketKind::Message,
            other => return Err(CodecError::UnknownKind(other)),
        })
    }
}

/// Roster entry as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: PlayerId,
    pub name: String,
    pub color: Color32,
}

impl PlayerState {
    pub fn new(id: PlayerId, name: impl Into<String>, color: Color32) -> Self {
        Self {
            id,
            name: name.into(),
            color,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AliveEntry {
    pub id: PlayerId,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRejection {
    InvalidCredentials,
    AlreadyLoggedIn,
}

impl LoginRejection {
    pub fn sentinel(self) -> i32 {
        match self {
            LoginRejection::InvalidCredentials => LOGIN_INVALID_CREDENTIALS,
            LoginRejection::AlreadyLoggedIn => LOGIN_ALREADY_AUTHENTICATED,
        }
    }

    pub fn from_sentinel(value: i32) -> Option<Self> {
        match value {
            LOGIN_INVALID_CREDENTIALS => Some(LoginRejection::InvalidCredentials),
            LOGIN_ALREADY_AUTHENTICATED => Some(LoginRejection::AlreadyLoggedIn),
            _ => None,
        }
    }
}

/// Everything a client needs after a successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginGrant {
    pub player: PlayerState,
    pub peers: Vec<PlayerState>,
    pub tiles: Vec<u8>,
    pub spawn: Vec3,
}

/// Packets a client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Login {
        name: String,
        password: String,
    },
    /// STATE_UPDATE in the client to server direction: the sender's position.
    Position {
        position: Vec3,
    },
    SpawnBomb {
        position: Vec3,
    },
    Chat {
        name: String,
        color: Color32,
        message: String,
    },
}

/// Packets the server sends to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    LoginAccepted(LoginGrant),
    LoginRejected(LoginRejection),
    StateUpdate {
        alive: Vec<AliveEntry>,
    },
    SpawnBomb {
        position: Vec3,
    },
    RestartGame {
        winner: i32,
        tiles: Vec<u8>,
        spawn: Vec3,
        message: String,
    },
    PlayerJoin(PlayerState),
    PlayerLeft {
        id: PlayerId,
    },
    Chat {
        name: String,
        color: Color32,
        message: String,
    },
}

/// Body of the discovery advertisement (MESSAGE kind).
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub text: String,
    pub value: f32,
    pub offset: Vec3,
}

impl Default for Announcement {
    fn default() -> Self {
        Self {
            text: String::from("HI ITS ME THE SERVER CONNECT UP"),
            value: 23.11074,
            offset: Vec3::new(2.0, 1.0, 0.0),
        }
    }
}

fn write_player(writer: &mut PacketWriter, player: &PlayerState) -> Result<(), CodecError> {
    writer.write_int(wire_id(player.id)?);
    writer.write_string(&player.name)?;
    writer.write_color(player.color);
    Ok(())
}

fn read_player(reader: &mut PacketReader<'_>) -> Result<PlayerState, CodecError> {
    let id = read_id(reader)?;
    let name = reader.read_string()?;
    let color = reader.read_color()?;
    Ok(PlayerState { id, name, color })
}

fn wire_id(id: PlayerId) -> Result<i32, CodecError> {
    i32::try_from(id).map_err(|_| CodecError::InvalidValue("player id out of range"))
}

fn read_id(reader: &mut PacketReader<'_>) -> Result<PlayerId, CodecError> {
    let id = reader.read_int()?;
    PlayerId::try_from(id).map_err(|_| CodecError::InvalidValue("negative player id"))
}

fn write_tiles(writer: &mut PacketWriter, tiles: &[u8]) -> Result<(), CodecError> {
    let count =
        i32::try_from(tiles.len()).map_err(|_| CodecError::InvalidValue("too many tiles"))?;
    writer.write_int(count).write_bytes(tiles);
    Ok(())
}

fn read_tiles(reader: &mut PacketReader<'_>) -> Result<Vec<u8>, CodecError> {
    let count = reader.read_count()?;
    reader.read_bytes(count)
}

impl ClientMessage {
    pub fn kind(&self) -> PacketKind {
        match self {
            ClientMessage::Login { .. } => PacketKind::Login,
            ClientMessage::Position { .. } => PacketKind::StateUpdate,
            ClientMessage::SpawnBomb { .. } => PacketKind::SpawnBomb,
            ClientMessage::Chat { .. } => PacketKind::ChatMessage,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = PacketWriter::new(self.kind());
        match self {
            ClientMessage::Login { name, password } => {
                writer.write_string(name)?;
                writer.write_string(password)?;
            }
            ClientMessage::Position { position } | ClientMessage::SpawnBomb { position } => {
                writer.write_vector3(*position);
            }
            ClientMessage::Chat {
                name,
                color,
                message,
            } => {
                writer.write_string(name)?;
                writer.write_color(*color);
                writer.write_string(message)?;
            }
        }
        Ok(writer.finish())
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PacketReader::new(data);
        let kind = reader.read_kind()?;
        let message = match kind {
            PacketKind::Login => ClientMessage::Login {
                name: reader.read_string()?,
                password: reader.read_string()?,
            },
            PacketKind::StateUpdate => ClientMessage::Position {
                position: reader.read_vector3()?,
            },
            PacketKind::SpawnBomb => ClientMessage::SpawnBomb {
                position: reader.read_vector3()?,
            },
            PacketKind::ChatMessage => ClientMessage::Chat {
                name: reader.read_string()?,
                color: reader.read_color()?,
                message: reader.read_string()?,
            },
            _ => return Err(CodecError::InvalidValue("packet kind not accepted by server")),
        };
        Ok(message)
    }
}

impl ServerMessage {
    pub fn kind(&self) -> PacketKind {
        match self {
            ServerMessage::LoginAccepted(_) | ServerMessage::LoginRejected(_) => PacketKind::Login,
            ServerMessage::StateUpdate { .. } => PacketKind::StateUpdate,
            ServerMessage::SpawnBomb { .. } => PacketKind::SpawnBomb,
            ServerMessage::RestartGame { .. } => PacketKind::RestartGame,
            ServerMessage::PlayerJoin(_) => PacketKind::PlayerJoin,
            ServerMessage::PlayerLeft { .. } => PacketKind::PlayerLeft,
            ServerMessage::Chat { .. } => PacketKind::ChatMessage,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = PacketWriter::new(self.kind());
        match self {
            ServerMessage::LoginAccepted(grant) => {
                writer.write_int(wire_id(grant.player.id)?);
                write_tiles(&mut writer, &grant.tiles)?;
                writer.write_string(&grant.player.name)?;
                writer.write_color(grant.player.color);
                writer.write_int(grant.peers.len() as i32);
                for peer in &grant.peers {
                    write_player(&mut writer, peer)?;
                }
                writer.write_vector3(grant.spawn);
            }
            ServerMessage::LoginRejected(rejection) => {
                writer.write_int(rejection.sentinel());
            }
            ServerMessage::StateUpdate { alive } => {
                writer.write_int(alive.len() as i32);
                for entry in alive {
                    writer.write_int(wire_id(entry.id)?);
                    writer.write_vector3(entry.position);
                }
            }
            ServerMessage::SpawnBomb { position } => {
                writer.write_vector3(*position);
            }
            ServerMessage::RestartGame {
                winner,
                tiles,
                spawn,
                message,
            } => {
                writer.write_int(*winner);
                write_tiles(&mut writer, tiles)?;
                writer.write_vector3(*spawn);
                writer.write_string(message)?;
            }
            ServerMessage::PlayerJoin(player) => {
                write_player(&mut writer, player)?;
            }
            ServerMessage::PlayerLeft { id } => {
                writer.write_int(wire_id(*id)?);
            }
            ServerMessage::Chat {
                name,
                color,
                message,
            } => {
                writer.write_string(name)?;
                writer.write_color(*color);
                writer.write_string(message)?;
            }
        }
        Ok(writer.finish())
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PacketReader::new(data);
        let kind = reader.read_kind()?;
        let message = match kind {
            PacketKind::Login => {
                let id = reader.read_int()?;
                if id < 0 {
                    let rejection = LoginRejection::from_sentinel(id)
                        .ok_or(CodecError::InvalidValue("unknown login sentinel"))?;
                    return Ok(ServerMessage::LoginRejected(rejection));
                }
                let tiles = read_tiles(&mut reader)?;
                let name = reader.read_string()?;
                let color = reader.read_color()?;
                let peer_count = reader.read_count()?;
                let mut peers = Vec::with_capacity(peer_count.min(64));
                for _ in 0..peer_count {
                    peers.push(read_player(&mut reader)?);
                }
                let spawn = reader.read_vector3()?;
                ServerMessage::LoginAccepted(LoginGrant {
                    player: PlayerState {
                        id: id as PlayerId,
                        name,
                        color,
                    },
                    peers,
                    tiles,
                    spawn,
                })
            }
            PacketKind::StateUpdate => {
                let count = reader.read_count()?;
                let mut alive = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let id = read_id(&mut reader)?;
                    let position = reader.read_vector3()?;
                    alive.push(AliveEntry { id, position });
                }
                ServerMessage::StateUpdate { alive }
            }
            PacketKind::SpawnBomb => ServerMessage::SpawnBomb {
                position: reader.read_vector3()?,
            },
            PacketKind::RestartGame => ServerMessage::RestartGame {
                winner: reader.read_int()?,
                tiles: read_tiles(&mut reader)?,
                spawn: reader.read_vector3()?,
                message: reader.read_string()?,
            },
            PacketKind::PlayerJoin => ServerMessage::PlayerJoin(read_player(&mut reader)?),
            PacketKind::PlayerLeft => ServerMessage::PlayerLeft {
                id: read_id(&mut reader)?,
            },
            PacketKind::ChatMessage => ServerMessage::Chat {
                name: reader.read_string()?,
                color: reader.read_color()?,
                message: reader.read_string()?,
            },
            PacketKind::Message => {
                return Err(CodecError::InvalidValue("advertisement sent as session data"));
            }
        };
        Ok(message)
    }
}

impl Announcement {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut writer = PacketWriter::new(PacketKind::Message);
        writer.write_string(&self.text)?;
        writer.write_float(self.value).write_vector3(self.offset);
        Ok(writer.finish())
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PacketReader::new(data);
        match reader.read_kind()? {
            PacketKind::Message => Ok(Self {
                text: reader.read_string()?,
                value: reader.read_float()?,
                offset: reader.read_vector3()?,
            }),
            _ => Err(CodecError::InvalidValue("expected advertisement")),
        }
    }
}
