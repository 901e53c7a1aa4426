//! quinn-backed [`Transport`].
//!
//! Every dial binds its own client endpoint on an unspecified address of the
//! remote's family, the way a stream socket gets an ephemeral local port.
//! Listening wraps the socket the core bound into a server endpoint.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use quicconn_core::Transport;
use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use tracing::debug;

use crate::{error::ConfigError, listener::QuinnListener, session::QuinnSession};

/// QUIC transport parameters applied to both sides.
///
/// `None` keeps quinn's default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuinnOptions {
    /// Interval of keep-alive packets while a session is idle.
    pub keep_alive_interval: Option<Duration>,

    /// Idle time after which a session is considered lost.
    pub max_idle_timeout: Option<Duration>,
}

impl QuinnOptions {
    fn transport_config(&self) -> Result<Arc<quinn::TransportConfig>, ConfigError> {
        let mut config = quinn::TransportConfig::default();
        if let Some(interval) = self.keep_alive_interval {
            config.keep_alive_interval(Some(interval));
        }
        if let Some(timeout) = self.max_idle_timeout {
            config.max_idle_timeout(Some(quinn::IdleTimeout::try_from(timeout)?));
        }
        Ok(Arc::new(config))
    }
}

/// Transport dialing and listening with quinn.
///
/// A transport built without a client configuration cannot dial, and one
/// without a server configuration cannot listen.
#[derive(Debug, Clone)]
pub struct QuinnTransport {
    client: Option<quinn::ClientConfig>,
    server: Option<quinn::ServerConfig>,
}

impl QuinnTransport {
    /// Build from rustls configurations.
    ///
    /// Both must use TLS 1.3 with a cipher suite QUIC can protect initial
    /// packets with.
    pub fn new(
        client: Option<rustls::ClientConfig>,
        server: Option<rustls::ServerConfig>,
        options: &QuinnOptions,
    ) -> Result<Self, ConfigError> {
        let transport = options.transport_config()?;

        let client = client
            .map(|tls| -> Result<_, ConfigError> {
                let mut config = quinn::ClientConfig::new(Arc::new(QuicClientConfig::try_from(tls)?));
                config.transport_config(Arc::clone(&transport));
                Ok(config)
            })
            .transpose()?;

        let server = server
            .map(|tls| -> Result<_, ConfigError> {
                let mut config =
                    quinn::ServerConfig::with_crypto(Arc::new(QuicServerConfig::try_from(tls)?));
                config.transport_config(Arc::clone(&transport));
                Ok(config)
            })
            .transpose()?;

        Ok(Self { client, server })
    }

    /// Dial-only transport with default options.
    pub fn client(tls: rustls::ClientConfig) -> Result<Self, ConfigError> {
        Self::new(Some(tls), None, &QuinnOptions::default())
    }

    /// Listen-only transport with default options.
    pub fn server(tls: rustls::ServerConfig) -> Result<Self, ConfigError> {
        Self::new(None, Some(tls), &QuinnOptions::default())
    }
}

fn unspecified_for(remote: SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    }
}

#[async_trait]
impl Transport for QuinnTransport {
    type Session = QuinnSession;
    type Listener = QuinnListener;

    async fn dial(&self, remote: SocketAddr, server_name: &str) -> io::Result<QuinnSession> {
        let config = self.client.clone().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "transport has no client TLS configuration")
        })?;

        let endpoint = quinn::Endpoint::client(unspecified_for(remote))?;
        let connecting = endpoint
            .connect_with(config, remote, server_name)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
        let conn = connecting.await?;

        debug!(%remote, server_name, "quic: connected");
        Ok(QuinnSession::new(conn, endpoint))
    }

    async fn listen(&self, socket: UdpSocket) -> io::Result<QuinnListener> {
        let config = self.server.clone().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "transport has no server TLS configuration")
        })?;

        let endpoint = quinn::Endpoint::new(
            quinn::EndpointConfig::default(),
            Some(config),
            socket,
            Arc::new(quinn::TokioRuntime),
        )?;

        debug!(local = ?endpoint.local_addr().ok(), "quic: endpoint listening");
        Ok(QuinnListener::new(endpoint))
    }
}
