//! Transport abstraction for secure multiplexed session protocols.
//!
//! Abstracts over transports with a cryptographic handshake and multiplexed
//! streams (like QUIC). Production uses quinn, tests use the in-memory doubles
//! from `quicconn-harness`.
//!
//! The adapter only needs a narrow slice of the transport: establish a session,
//! open one stream towards the peer, accept one stream from the peer, and
//! close. Everything else (packet protection, loss recovery, stream framing)
//! stays inside the transport.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::handshake::HandshakeNotifier;

/// Entry point of a session transport: dial out or listen on a socket.
///
/// Passed by value to [`dial`](crate::dial) and [`listen`](crate::listen), so
/// tests substitute a double instead of rebinding a global.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Session type produced by both dial and listen.
    type Session: Session;

    /// Listener type returned by [`Transport::listen`].
    type Listener: TransportListener<Session = Self::Session>;

    /// Establish a session with `remote`.
    ///
    /// Returns only once the handshake has reached the forward-secure state.
    /// `server_name` is the host part of the dialed address and is used for
    /// certificate verification.
    async fn dial(&self, remote: SocketAddr, server_name: &str) -> io::Result<Self::Session>;

    /// Start a transport listener on an already bound, non-blocking datagram
    /// socket.
    ///
    /// The returned listener does not accept anything until
    /// [`TransportListener::serve`] runs.
    async fn listen(&self, socket: std::net::UdpSocket) -> io::Result<Self::Listener>;
}

/// Server side of a transport.
#[async_trait]
pub trait TransportListener: Send + Sync + 'static {
    /// Session type handed to the notifier.
    type Session: Session;

    /// Run the accept loop.
    ///
    /// For every incoming session the listener calls
    /// [`HandshakeNotifier::track`] and reports handshake progress on the
    /// returned handle. A session is handed to `accept` only once the
    /// forward-secure transition is reported. Returns `Ok(())` once the
    /// listener is closed, or the error that stopped the loop.
    async fn serve(&self, notifier: HandshakeNotifier<Self::Session>) -> io::Result<()>;

    /// Stop accepting new sessions.
    fn close(&self) -> io::Result<()>;
}

/// An established secure session carrying multiplexed streams.
///
/// Handles are cheap to clone and refer to the same session.
#[async_trait]
pub trait Session: Clone + Send + Sync + Unpin + 'static {
    /// Write half of a stream opened by this side.
    type SendStream: AsyncWrite + Unpin + Send + 'static;

    /// Read half of a stream opened by the peer.
    type RecvStream: AsyncRead + Unpin + Send + 'static;

    /// Open a new stream towards the peer.
    async fn open_stream(&self) -> io::Result<Self::SendStream>;

    /// Wait for the peer to open a stream.
    async fn accept_stream(&self) -> io::Result<Self::RecvStream>;

    /// Close the session with no error code.
    fn close(&self) -> io::Result<()>;

    /// Local address, if the transport reports one.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Remote address, if the transport reports one.
    fn remote_addr(&self) -> Option<SocketAddr>;
}
