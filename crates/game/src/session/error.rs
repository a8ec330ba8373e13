use crate::net::{CodecError, PortSearchError, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    PortSearch(#[from] PortSearchError),
    #[error("broadcast discovery could not start: {0}")]
    DiscoveryStart(#[source] TransportError),
    #[error("not connected to a server")]
    NotConnected,
    #[error("session is not running")]
    NotRunning,
}
