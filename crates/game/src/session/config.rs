use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::{
    Channel, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT, DISCOVERY_KEY, DiscoveryFilter, HostConfig,
    PROTOCOL_SUBVERSION, PROTOCOL_VERSION, PacketLossSimulation,
};

/// Client-side countdowns, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientTimers {
    pub bind_retry: f32,
    pub reconnect_grace: f32,
    pub host_election: f32,
    pub names_refresh: f32,
}

impl Default for ClientTimers {
    fn default() -> Self {
        Self {
            bind_retry: 1.0,
            reconnect_grace: 0.5,
            host_election: 2.0,
            names_refresh: 0.5,
        }
    }
}

/// Fixed for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The server listens here.
    pub port: u16,
    pub discovery_key: u32,
    pub protocol_version: u32,
    pub protocol_subversion: u32,
    pub max_connections: usize,
    pub reliable_channel: Channel,
    pub bind_addr: IpAddr,
    pub broadcast_addr: IpAddr,
    pub broadcast_interval: Duration,
    /// Seconds between STATE_UPDATE pushes.
    pub state_interval: f32,
    pub connect_timeout: Duration,
    pub connection_timeout: Duration,
    pub timers: ClientTimers,
    pub loss_simulation: Option<PacketLossSimulation>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            discovery_key: DISCOVERY_KEY,
            protocol_version: PROTOCOL_VERSION,
            protocol_subversion: PROTOCOL_SUBVERSION,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            reliable_channel: Channel::Reliable,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            broadcast_interval: Duration::from_millis(500),
            state_interval: 0.05,
            connect_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(10),
            timers: ClientTimers::default(),
            loss_simulation: None,
        }
    }
}

impl SessionConfig {
    /// Clients listen for advertisements one port below the server.
    pub fn discovery_port(&self) -> u16 {
        self.port.saturating_sub(1)
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn discovery_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.discovery_port())
    }

    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_addr, self.discovery_port())
    }

    pub fn discovery_filter(&self) -> DiscoveryFilter {
        DiscoveryFilter::new(
            self.discovery_key,
            self.protocol_version,
            self.protocol_subversion,
        )
    }

    pub fn server_host_config(&self) -> HostConfig {
        HostConfig {
            max_connections: self.max_connections,
            accept_connections: true,
            connect_timeout: self.connect_timeout,
            connection_timeout: self.connection_timeout,
            loss_simulation: self.loss_simulation.clone(),
            ..Default::default()
        }
    }

    pub fn client_host_config(&self) -> HostConfig {
        HostConfig {
            max_connections: 1,
            accept_connections: false,
            connect_timeout: self.connect_timeout,
            connection_timeout: self.connection_timeout,
            loss_simulation: self.loss_simulation.clone(),
            ..Default::default()
        }
    }
}
