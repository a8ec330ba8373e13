pub mod net;
pub mod session;
pub mod world;

pub use net::{
    AliveEntry, Announcement, Channel, ClientMessage, CodecError, Color32, ConnectionId,
    DEFAULT_PORT, DiscoveryFilter, Host, HostConfig, LoginGrant, LoginRejection, MAX_NAME_LEN,
    NetEvent, NetworkStats, PacketKind, PacketLossSimulation, PacketReader, PacketWriter,
    PlayerId, PlayerState, PortSearchError, ServerMessage, TransportError, find_private_port,
};
pub use session::{
    ClientEvent, ClientSession, ClientState, CredentialStore, GameOver, MemoryCredentialStore,
    PeerList, Roster, SceneLoad, ServerEvent, ServerSession, ServerState, SessionConfig,
    SessionError, UiSink, World,
};
pub use world::TileWorld;
