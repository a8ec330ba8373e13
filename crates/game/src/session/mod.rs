mod client;
mod collab;
mod config;
mod error;
mod events;
mod registry;
mod server;
mod timer;

pub use client::{ClientSession, ClientState, SceneLoad};
pub use collab::{CredentialStore, GameOver, MemoryCredentialStore, UiSink, World};
pub use config::{ClientTimers, SessionConfig};
pub use error::SessionError;
pub use events::{ClientEvent, ServerEvent};
pub use registry::{
    PeerList, PlayerState, PlayerSync, ReconcileReport, Roster, ServerPlayer, ServerRoster,
    palette_color,
};
pub use server::{ServerSession, ServerState};
pub use timer::Countdown;
