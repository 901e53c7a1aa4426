//! Error types for the connection and listener adapters.
//!
//! Every variant keeps the transport's [`io::Error`] as its source. The
//! adapter adds the name of the failed operation but never changes the error
//! kind, so callers matching on [`io::ErrorKind`] see what the transport saw.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Errors surfaced by dial, listen, accept and close.
#[derive(Debug, Error)]
pub enum Error {
    /// Network name is not one of `udp`, `udp4`, `udp6`.
    #[error("unknown network {0:?}")]
    UnknownNetwork(String),

    /// Address could not be resolved.
    #[error("resolve {addr}: {source}")]
    Resolve {
        /// Address as given by the caller
        addr: String,
        /// Resolver error
        source: io::Error,
    },

    /// Address resolved, but not to any address of the requested family.
    #[error("no {network} address for {addr}")]
    NoAddress {
        /// Requested network
        network: &'static str,
        /// Address as given by the caller
        addr: String,
    },

    /// Datagram socket could not be bound.
    #[error("bind {addr}: {source}")]
    Bind {
        /// Local address we tried to bind
        addr: SocketAddr,
        /// Socket error
        source: io::Error,
    },

    /// Transport refused to start listening on the bound socket.
    #[error("listen: {0}")]
    Listen(#[source] io::Error),

    /// Session establishment to a remote peer failed.
    #[error("dial {addr}: {source}")]
    Dial {
        /// Remote address
        addr: SocketAddr,
        /// Transport error
        source: io::Error,
    },

    /// An incoming session failed its handshake, or the serve loop failed.
    #[error("handshake: {0}")]
    Handshake(#[source] io::Error),

    /// Send stream could not be opened on an established session.
    #[error("open stream: {0}")]
    OpenStream(#[source] io::Error),

    /// Peer's stream could not be accepted.
    #[error("accept stream: {0}")]
    AcceptStream(#[source] io::Error),

    /// Closing the session or the transport listener failed.
    #[error("close: {0}")]
    Close(#[source] io::Error),

    /// Listener was closed while accepting.
    #[error("listener closed")]
    ListenerClosed,
}

impl Error {
    /// I/O error kind of the underlying failure.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::UnknownNetwork(_) => io::ErrorKind::InvalidInput,
            Self::NoAddress { .. } => io::ErrorKind::AddrNotAvailable,
            Self::ListenerClosed => io::ErrorKind::NotConnected,
            Self::Resolve { source, .. } | Self::Bind { source, .. } | Self::Dial { source, .. } => {
                source.kind()
            },
            Self::Listen(source)
            | Self::Handshake(source)
            | Self::OpenStream(source)
            | Self::AcceptStream(source)
            | Self::Close(source) => source.kind(),
        }
    }

    /// Underlying transport error, if this error wraps one.
    pub fn io_source(&self) -> Option<&io::Error> {
        match self {
            Self::UnknownNetwork(_) | Self::NoAddress { .. } | Self::ListenerClosed => None,
            Self::Resolve { source, .. } | Self::Bind { source, .. } | Self::Dial { source, .. } => {
                Some(source)
            },
            Self::Listen(source)
            | Self::Handshake(source)
            | Self::OpenStream(source)
            | Self::AcceptStream(source)
            | Self::Close(source) => Some(source),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        io::Error::new(err.kind(), err)
    }
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_source() {
        let err = Error::AcceptStream(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

        let err = Error::Dial {
            addr: "127.0.0.1:4433".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"),
        };
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(err.io_source().map(ToString::to_string).as_deref(), Some("handshake timed out"));
    }

    #[test]
    fn io_conversion_keeps_kind_and_context() {
        let err = Error::Close(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        let io_err = io::Error::from(err);

        assert_eq!(io_err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(io_err.to_string(), "close: gone");
    }

    #[test]
    fn listener_closed_is_not_connected() {
        assert_eq!(Error::ListenerClosed.kind(), io::ErrorKind::NotConnected);
        assert!(Error::ListenerClosed.io_source().is_none());
    }
}
