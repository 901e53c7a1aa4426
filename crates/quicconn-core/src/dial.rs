//! Dial and listen entry points.

use tracing::debug;

use crate::{
    config::ListenerConfig,
    conn::Conn,
    error::{Error, Result},
    listener::Listener,
    net::{self, Network},
    transport::Transport,
};

/// Connect to `addr` over `network` (`udp`, `udp4` or `udp6`).
///
/// Returns once the session is forward-secure and the send stream is open.
/// The host part of `addr` is passed to the transport as the TLS server name.
pub async fn dial<T: Transport>(
    transport: &T,
    network: &str,
    addr: &str,
) -> Result<Conn<T::Session>> {
    let network: Network = network.parse()?;
    let remote = net::resolve(network, addr).await?;

    let session = transport
        .dial(remote, net::server_name(addr))
        .await
        .map_err(|source| Error::Dial { addr: remote, source })?;
    debug!(%remote, "session established");

    Conn::establish(session).await
}

/// Listen on `addr` over `network` with the default configuration.
pub async fn listen<T: Transport>(
    transport: &T,
    network: &str,
    addr: &str,
) -> Result<Listener<T::Listener>> {
    listen_with_config(transport, network, addr, &ListenerConfig::default()).await
}

/// Bind a datagram socket on `addr` and start the transport listener on it.
///
/// Port `0` picks an ephemeral port; [`Listener::local_addr`] reports it.
pub async fn listen_with_config<T: Transport>(
    transport: &T,
    network: &str,
    addr: &str,
    config: &ListenerConfig,
) -> Result<Listener<T::Listener>> {
    let network: Network = network.parse()?;
    let bind_addr = net::resolve(network, addr).await?;

    let socket = std::net::UdpSocket::bind(bind_addr)
        .and_then(|socket| socket.set_nonblocking(true).map(|()| socket))
        .map_err(|source| Error::Bind { addr: bind_addr, source })?;
    let local_addr =
        socket.local_addr().map_err(|source| Error::Bind { addr: bind_addr, source })?;

    let transport_listener = transport.listen(socket).await.map_err(Error::Listen)?;
    debug!(%local_addr, %network, "listening");

    Ok(Listener::start(transport_listener, local_addr, config))
}
