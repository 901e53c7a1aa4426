//! Error types for the quinn binding.

use quinn::{VarIntBoundsExceeded, crypto::rustls::NoInitialCipherSuite};
use thiserror::Error;

/// Transport configuration could not be built.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TLS configuration offers no cipher suite usable for QUIC initial packets.
    #[error("TLS config unusable for QUIC: {0}")]
    Tls(#[from] NoInitialCipherSuite),

    /// Idle timeout does not fit a QUIC variable-length integer.
    #[error("idle timeout out of range: {0}")]
    IdleTimeout(#[from] VarIntBoundsExceeded),
}

/// Errors from the convenience [`dial`](crate::dial) and [`listen`](crate::listen).
#[derive(Debug, Error)]
pub enum Error {
    /// Transport configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Dial, listen or connection setup failed.
    #[error(transparent)]
    Conn(#[from] quicconn_core::Error),
}
