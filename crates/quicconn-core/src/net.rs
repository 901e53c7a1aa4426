//! Network names and address resolution for dial and listen.

use std::{fmt, net::SocketAddr, str::FromStr};

use crate::error::{Error, Result};

/// Datagram network to dial or listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// IPv4 or IPv6, whichever resolves first
    Udp,
    /// IPv4 only
    Udp4,
    /// IPv6 only
    Udp6,
}

impl Network {
    /// Name as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
        }
    }

    fn admits(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Udp => true,
            Self::Udp4 => addr.is_ipv4(),
            Self::Udp6 => addr.is_ipv6(),
        }
    }

    fn unspecified_host(self) -> &'static str {
        match self {
            Self::Udp | Self::Udp4 => "0.0.0.0",
            Self::Udp6 => "[::]",
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "udp" => Ok(Self::Udp),
            "udp4" => Ok(Self::Udp4),
            "udp6" => Ok(Self::Udp6),
            other => Err(Error::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve `addr` (`host:port`) to the first address of `network`'s family.
///
/// An empty host (`":4433"`) means the unspecified address.
pub(crate) async fn resolve(network: Network, addr: &str) -> Result<SocketAddr> {
    let target = if addr.starts_with(':') {
        format!("{}{addr}", network.unspecified_host())
    } else {
        addr.to_string()
    };

    let mut candidates = tokio::net::lookup_host(target.as_str())
        .await
        .map_err(|source| Error::Resolve { addr: addr.to_string(), source })?;

    candidates
        .find(|candidate| network.admits(candidate))
        .ok_or_else(|| Error::NoAddress { network: network.as_str(), addr: addr.to_string() })
}

/// Host part of `host:port`, without IPv6 brackets.
pub(crate) fn server_name(addr: &str) -> &str {
    let host = addr.rsplit_once(':').map_or(addr, |(host, _port)| host);
    host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_networks() {
        assert_eq!("udp".parse::<Network>().unwrap(), Network::Udp);
        assert_eq!("udp4".parse::<Network>().unwrap(), Network::Udp4);
        assert_eq!("udp6".parse::<Network>().unwrap(), Network::Udp6);
    }

    #[test]
    fn rejects_stream_networks() {
        let err = "tcp".parse::<Network>().unwrap_err();
        assert!(matches!(err, Error::UnknownNetwork(ref name) if name == "tcp"));
    }

    #[test]
    fn server_name_strips_port_and_brackets() {
        assert_eq!(server_name("example.com:443"), "example.com");
        assert_eq!(server_name("127.0.0.1:4433"), "127.0.0.1");
        assert_eq!(server_name("[::1]:4433"), "::1");
        assert_eq!(server_name("localhost"), "localhost");
    }

    #[tokio::test]
    async fn resolves_literal_address() {
        let addr = resolve(Network::Udp4, "127.0.0.1:4433").await.unwrap();
        assert_eq!(addr, "127.0.0.1:4433".parse().unwrap());
    }

    #[tokio::test]
    async fn empty_host_is_unspecified() {
        let addr = resolve(Network::Udp, ":0").await.unwrap();
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 0);
    }

    #[tokio::test]
    async fn family_mismatch_is_reported() {
        let err = resolve(Network::Udp6, "127.0.0.1:4433").await.unwrap_err();
        assert!(matches!(err, Error::NoAddress { network: "udp6", .. }));
    }

    #[tokio::test]
    async fn missing_port_fails_resolution() {
        let err = resolve(Network::Udp, "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, Error::Resolve { .. }));
    }
}
