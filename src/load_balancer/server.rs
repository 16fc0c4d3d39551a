//! Server address abstraction.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Address of one graph server replica.
///
/// Identity is by value. Cheap to clone: the host is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddress {
    host: Arc<str>,
    port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host: String = host.into();
        Self {
            host: Arc::from(host),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Target usable with `tokio::net::TcpStream::connect`.
    pub fn connect_target(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<std::net::SocketAddr> for ServerAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Error parsing a `host:port` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid server address '{0}', expected host:port")]
pub struct AddressParseError(String);

impl FromStr for ServerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port: u16 = port.parse().map_err(|_| AddressParseError(s.to_string()))?;
        if host.is_empty() {
            return Err(AddressParseError(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        let a = ServerAddress::new("graph-1", 8182);
        let b: ServerAddress = "graph-1:8182".parse().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, ServerAddress::new("graph-1", 8183));
    }

    #[test]
    fn test_display_and_parse() {
        let v6: ServerAddress = "[::1]:9000".parse().unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.to_string(), "[::1]:9000");

        assert!("graph-1".parse::<ServerAddress>().is_err());
        assert!(":80".parse::<ServerAddress>().is_err());
        assert!("host:notaport".parse::<ServerAddress>().is_err());
    }

    #[test]
    fn test_from_socket_addr() {
        let addr: std::net::SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let server = ServerAddress::from(addr);
        assert_eq!(server.connect_target(), ("127.0.0.1", 8080));
    }
}
