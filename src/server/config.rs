//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;
use crate::server::policy::OriginPolicy;

/// Server configuration options
///
/// Everything except `port` is fixed once the server is constructed. The port
/// can be changed while running through `MjpegServer::set_port`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to listen on
    pub bind_ip: IpAddr,

    /// Initial listening port (0 = OS-assigned)
    pub port: u16,

    /// How long a single accept may wait before the loop re-checks its state
    pub accept_timeout: Duration,

    /// Deadline for writing one part to a client
    pub write_timeout: Duration,

    /// Multipart boundary token
    pub boundary: String,

    /// Which peers are served
    pub origin_policy: OriginPolicy,

    /// Maximum concurrent streaming connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Upper bound of the backoff between failed rebind attempts
    pub max_rebind_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            boundary: DEFAULT_BOUNDARY.to_string(),
            origin_policy: OriginPolicy::default(),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,  // Frames should leave as soon as they are written
            max_rebind_backoff: DEFAULT_MAX_REBIND_BACKOFF,
        }
    }
}

impl ServerConfig {
    /// Create a new config listening on the given port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Address the listener binds to for the given port
    pub fn bind_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_ip, port)
    }

    /// Set the interface to listen on
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Set the initial port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the accept timeout
    pub fn accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    /// Set the per-part write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the multipart boundary token
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    /// Set the origin policy
    pub fn origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.origin_policy = policy;
        self
    }

    /// Set maximum concurrent connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the rebind backoff cap
    pub fn max_rebind_backoff(mut self, max: Duration) -> Self {
        self.max_rebind_backoff = max;
        self
    }
}
