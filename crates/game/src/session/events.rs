use std::net::SocketAddr;

use crate::net::{ConnectionId, LoginRejection, PlayerId};

use super::registry::ReconcileReport;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Started {
        addr: SocketAddr,
    },
    ClientConnected {
        connection: ConnectionId,
    },
    ClientDisconnected {
        connection: ConnectionId,
        name: Option<String>,
    },
    LoginAccepted {
        id: PlayerId,
        name: String,
        registered: bool,
    },
    LoginRejected {
        connection: ConnectionId,
        name: String,
        rejection: LoginRejection,
    },
    Chat {
        name: String,
        message: String,
    },
    PlayerEliminated {
        id: PlayerId,
    },
    RoundOver {
        winner: i32,
        message: String,
    },
    ProtocolError {
        connection: ConnectionId,
        message: String,
    },
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// No advertisement was heard in time; the host loop may start a
    /// server of its own.
    HostElectionDue,
    ServerFound {
        addr: SocketAddr,
    },
    Connected {
        server: SocketAddr,
        local_port: u16,
    },
    LoginAccepted {
        id: PlayerId,
    },
    LoginRejected(LoginRejection),
    /// A scene is waiting in [`super::ClientSession::pending_scene`].
    SceneLoadReady,
    PeersChanged(ReconcileReport),
    RoundRestarted {
        winner: i32,
        message: String,
    },
    PlayerJoined {
        id: PlayerId,
        name: String,
    },
    PlayerLeft {
        id: PlayerId,
    },
    Chat {
        name: String,
        message: String,
    },
    ReturnedToMenu {
        reason: String,
    },
}

impl ClientEvent {
    pub fn describe(&self) -> String {
        match self {
            ClientEvent::HostElectionDue => "no server heard, electing self as host".to_string(),
            ClientEvent::ServerFound { addr } => format!("server found at {}", addr),
            ClientEvent::Connected { server, local_port } => {
                format!("connected to {} from port {}", server, local_port)
            }
            ClientEvent::LoginAccepted { id } => format!("logged in as player {}", id),
            ClientEvent::LoginRejected(rejection) => format!("login rejected: {:?}", rejection),
            ClientEvent::SceneLoadReady => "scene ready to load".to_string(),
            ClientEvent::PeersChanged(report) => format!(
                "peers +{:?} -{:?}",
                report.created, report.destroyed
            ),
            ClientEvent::RoundRestarted { message, .. } => format!("round over: {}", message),
            ClientEvent::PlayerJoined { name, .. } => format!("{} joined", name),
            ClientEvent::PlayerLeft { id } => format!("player {} left", id),
            ClientEvent::Chat { name, message } => format!("{}: {}", name, message),
            ClientEvent::ReturnedToMenu { reason } => format!("back to menu: {}", reason),
        }
    }
}
