//! One quinn connection as a [`Session`].

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use quicconn_core::Session;
use quinn::VarInt;

/// Established quinn connection.
///
/// Holds the endpoint as well, so a dialed session keeps its client socket
/// alive and can report its local address.
#[derive(Debug, Clone)]
pub struct QuinnSession {
    conn: quinn::Connection,
    endpoint: quinn::Endpoint,
}

impl QuinnSession {
    pub(crate) fn new(conn: quinn::Connection, endpoint: quinn::Endpoint) -> Self {
        Self { conn, endpoint }
    }

    /// Underlying quinn connection.
    pub fn connection(&self) -> &quinn::Connection {
        &self.conn
    }
}

#[async_trait]
impl Session for QuinnSession {
    type SendStream = quinn::SendStream;
    type RecvStream = quinn::RecvStream;

    async fn open_stream(&self) -> io::Result<quinn::SendStream> {
        Ok(self.conn.open_uni().await?)
    }

    async fn accept_stream(&self) -> io::Result<quinn::RecvStream> {
        Ok(self.conn.accept_uni().await?)
    }

    fn close(&self) -> io::Result<()> {
        self.conn.close(VarInt::from_u32(0), b"");
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.local_addr().ok()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.conn.remote_address())
    }
}
