//! Broadcast filtering and the private port search a client runs after it
//! gives up the shared discovery port.

use std::fmt::Display;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Number of ports tried below the discovery port before giving up.
pub const PRIVATE_PORT_ATTEMPTS: u16 = 17;

/// Peers only see broadcasts whose triple matches their own exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveryFilter {
    pub key: u32,
    pub version: u32,
    pub subversion: u32,
}

impl DiscoveryFilter {
    pub fn new(key: u32, version: u32, subversion: u32) -> Self {
        Self {
            key,
            version,
            subversion,
        }
    }

    pub fn matches(&self, key: u32, version: u32, subversion: u32) -> bool {
        self.key == key && self.version == version && self.subversion == subversion
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortSearchError {
    #[error("no free port between {first} and {last} after {attempts} attempts")]
    Exhausted { first: u16, last: u16, attempts: u16 },
}

/// Candidate private ports, highest first: one below the discovery port
/// down to `PRIVATE_PORT_ATTEMPTS` below it.
pub fn private_ports(discovery_port: u16) -> impl Iterator<Item = u16> {
    let first = discovery_port.saturating_sub(1);
    let last = discovery_port.saturating_sub(PRIVATE_PORT_ATTEMPTS).max(1);
    (last..=first).rev().filter(move |&port| port < discovery_port)
}

/// Walks the private port range downward, calling `bind` for each port until
/// one succeeds.
pub fn find_private_port<T, E, F>(
    discovery_port: u16,
    mut bind: F,
) -> Result<(u16, T), PortSearchError>
where
    F: FnMut(u16) -> Result<T, E>,
    E: Display,
{
    let mut attempts = 0u16;
    for port in private_ports(discovery_port) {
        attempts += 1;
        match bind(port) {
            Ok(bound) => {
                debug!("bound private port {} after {} attempt(s)", port, attempts);
                return Ok((port, bound));
            }
            Err(e) => warn!("port {} unavailable: {}", port, e),
        }
    }

    Err(PortSearchError::Exhausted {
        first: discovery_port.saturating_sub(1),
        last: discovery_port.saturating_sub(PRIVATE_PORT_ATTEMPTS),
        attempts,
    })
}
