// Published port discovery and "all ports open" checks

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Per-connection ceiling for the port-open check
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// A container port published on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPort {
    pub host: String,
    pub port: u16,
    pub target_port: u16,
}

impl PublishedPort {
    /// Host address to dial; wildcard binds are reached through loopback
    pub fn dial_host(&self) -> &str {
        match self.host.as_str() {
            "" | "0.0.0.0" => "127.0.0.1",
            "::" => "::1",
            other => other,
        }
    }

    pub fn address(&self) -> String {
        let host = self.dial_host();
        if host.contains(':') {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

/// Check whether a TCP connection to `address` (`host:port`) can be opened
pub fn is_open(address: &str, timeout: Duration) -> bool {
    let addrs: Vec<SocketAddr> = match address.to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(_) => return false,
    };

    addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, timeout).is_ok())
}

/// Return the ports that did not accept a connection
pub fn closed_ports(ports: &[PublishedPort]) -> Vec<PublishedPort> {
    ports
        .iter()
        .filter(|p| !is_open(&p.address(), CONNECT_TIMEOUT))
        .cloned()
        .collect()
}
