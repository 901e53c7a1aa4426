//! Server side: quinn's accept loop reporting handshake progress.
//!
//! ```text
//! endpoint.accept() ──> Incoming          Initial
//!                          │ accept()     VersionNegotiated (quinn negotiates versions itself)
//!                          ▼
//!                      Connecting
//!                          │ handshake_data()   Secure
//!                          │ await              ForwardSecure ──> complete(session)
//! ```
//!
//! Each incoming connection runs its handshake in its own task, so a slow
//! peer never holds up the others.

use std::io;

use async_trait::async_trait;
use quicconn_core::{HandshakeNotifier, HandshakeState, Session, TransportListener};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::session::QuinnSession;

/// quinn endpoint serving incoming sessions.
#[derive(Debug)]
pub struct QuinnListener {
    endpoint: quinn::Endpoint,
    shutdown: CancellationToken,
}

impl QuinnListener {
    pub(crate) fn new(endpoint: quinn::Endpoint) -> Self {
        Self { endpoint, shutdown: CancellationToken::new() }
    }

    /// Underlying quinn endpoint.
    pub fn endpoint(&self) -> &quinn::Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl TransportListener for QuinnListener {
    type Session = QuinnSession;

    async fn serve(&self, notifier: HandshakeNotifier<QuinnSession>) -> io::Result<()> {
        loop {
            let incoming = tokio::select! {
                () = self.shutdown.cancelled() => return Ok(()),
                incoming = self.endpoint.accept() => incoming,
            };

            let Some(incoming) = incoming else {
                debug!("quinn endpoint closed, serve loop done");
                return Ok(());
            };

            tokio::spawn(handshake(notifier.clone(), incoming, self.endpoint.clone()));
        }
    }

    /// Stop accepting. Connections already accepted keep running.
    fn close(&self) -> io::Result<()> {
        self.endpoint.set_server_config(None);
        self.shutdown.cancel();
        Ok(())
    }
}

async fn handshake(
    notifier: HandshakeNotifier<QuinnSession>,
    incoming: quinn::Incoming,
    endpoint: quinn::Endpoint,
) {
    let remote = incoming.remote_address();
    let mut pending = notifier.track();
    debug!(session = pending.id(), %remote, "quic: incoming connection");

    let mut connecting = match incoming.accept() {
        Ok(connecting) => connecting,
        Err(error) => {
            pending.fail(error.into()).await;
            return;
        },
    };
    pending.advance(HandshakeState::VersionNegotiated);

    // Handshake data is available once the handshake keys are installed
    if let Err(error) = connecting.handshake_data().await.map(drop) {
        pending.fail(error.into()).await;
        return;
    }
    pending.advance(HandshakeState::Secure);

    match connecting.await {
        Ok(conn) => {
            debug!(%remote, "quic: handshake confirmed");
            if let Err(rejected) = pending.complete(QuinnSession::new(conn, endpoint)).await {
                if let Err(error) = rejected.close() {
                    warn!(%remote, %error, "quic: failed to close rejected session");
                }
            }
        },
        Err(error) => pending.fail(error.into()).await,
    }
}
