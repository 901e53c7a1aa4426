//! Stream-socket adapter over secure multiplexed transports.
//!
//! A QUIC-like transport offers many streams per session and finishes its
//! cryptographic handshake asynchronously. This crate hides both behind the
//! shape of a conventional stream socket: `dial`, `listen`, `accept`, and one
//! bidirectional byte channel per connection.
//!
//! # Architecture
//!
//! ```text
//! Application
//!     ↓
//! Conn / Listener          (this crate: one channel, handshake-gated accept)
//!     ↓
//! Transport / Session      (trait boundary)
//!     ↓
//! quinn, or test doubles   (quicconn-quinn, quicconn-harness)
//! ```
//!
//! # Components
//!
//! - [`Conn`]: one session as one byte stream (send stream eager, receive
//!   stream accepted on first read)
//! - [`Listener`]: accepts sessions once their handshake is forward-secure
//! - [`handshake`]: bridges the transport's progress reports to `accept`
//! - [`transport`]: the narrow interface consumed from the transport
//! - [`blocking`]: thread-blocking facade with `std::io::Read`/`Write`
//! - [`error`]: error taxonomy (setup, handshake, stream, close)

pub mod blocking;
pub mod config;
pub mod conn;
pub mod dial;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod net;
pub mod transport;

pub use config::ListenerConfig;
pub use conn::{Closer, Conn};
pub use dial::{dial, listen, listen_with_config};
pub use error::{Error, Result};
pub use handshake::{HandshakeNotifier, HandshakeState, PendingHandshake};
pub use listener::Listener;
pub use net::Network;
pub use transport::{Session, Transport, TransportListener};
