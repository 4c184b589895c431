use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

// Http server configuration.
#[derive(Deserialize, PartialEq, Eq, Debug, Serialize, Clone)]
pub struct ServerConfig {
    /// Port to listen on. Zero picks a free port.
    pub port: u16,
    /// IPv4 to listen on.
    pub ipv4: Ipv4Addr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            ipv4: Ipv4Addr::LOCALHOST,
        }
    }
}
