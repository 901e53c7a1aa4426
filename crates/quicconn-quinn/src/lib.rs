//! quinn binding for quicconn.
//!
//! [`QuinnTransport`] implements the core's transport traits on top of quinn:
//! sessions are QUIC connections, and each direction of a `Conn` is a
//! unidirectional QUIC stream. [`dial`] and [`listen`] are shortcuts that take
//! a rustls configuration directly.
//!
//! ```ignore
//! let listener = quicconn_quinn::listen("udp", "127.0.0.1:4433", server_tls).await?;
//! let mut conn = listener.accept().await?;
//! conn.write_all(b"hello").await?;
//! ```

pub mod error;
pub mod listener;
pub mod session;
pub mod transport;

pub use error::{ConfigError, Error};
pub use listener::QuinnListener;
use quicconn_core::{Conn, Listener};
pub use session::QuinnSession;
pub use transport::{QuinnOptions, QuinnTransport};

/// Dial `addr` over `network`, verifying the server with `tls`.
///
/// The host part of `addr` is the server name checked against the
/// certificate.
pub async fn dial(
    network: &str,
    addr: &str,
    tls: rustls::ClientConfig,
) -> Result<Conn<QuinnSession>, Error> {
    let transport = QuinnTransport::client(tls)?;
    Ok(quicconn_core::dial(&transport, network, addr).await?)
}

/// Listen on `addr` over `network`, presenting the certificate in `tls`.
pub async fn listen(
    network: &str,
    addr: &str,
    tls: rustls::ServerConfig,
) -> Result<Listener<QuinnListener>, Error> {
    let transport = QuinnTransport::server(tls)?;
    Ok(quicconn_core::listen(&transport, network, addr).await?)
}
