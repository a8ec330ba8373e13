mod codec;
mod connection;
mod discovery;
mod frame;
mod protocol;
mod stats;
mod tracking;
mod transport;

pub use codec::{CodecError, Color32, MAX_STRING_LEN, PacketReader, PacketWriter};
pub use connection::{ConnectionId, ConnectionTable, Link, LinkState};
pub use discovery::{
    DiscoveryFilter, PRIVATE_PORT_ATTEMPTS, PortSearchError, find_private_port, private_ports,
};
pub use frame::{Channel, FRAME_MAGIC, FRAME_VERSION, Frame, FrameBody, FrameError, MAX_FRAME_SIZE};
pub use protocol::{
    AliveEntry, Announcement, ClientMessage, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT, DISCOVERY_KEY,
    LOGIN_ALREADY_AUTHENTICATED, LOGIN_INVALID_CREDENTIALS, LoginGrant, LoginRejection,
    MAX_NAME_LEN, PROTOCOL_SUBVERSION, PROTOCOL_VERSION, PacketKind, PlayerId, PlayerState,
    ServerMessage,
};
pub use stats::{NetworkStats, PacketLossSimulation};
pub use tracking::{
    PendingFrame, ReliableReceiver, ReliableSender, SequencedReceiver, sequence_greater_than,
};
pub use transport::{Host, HostConfig, NetEvent, TransportError};
