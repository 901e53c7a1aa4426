//! Listener adapter: accepts one ready session per call.
//!
//! # State machine
//!
//! ```text
//! ┌──────┐  start   ┌─────────┐  track()   ┌──────────────────┐  complete()  ┌───────┐
//! │ Idle │─────────>│ Serving │───────────>│ AwaitingHandshake│─────────────>│ Ready │
//! └──────┘          └─────────┘            └──────────────────┘              └───────┘
//!                                                                                │
//!                                                   accept(): open send stream <─┘
//! ```
//!
//! A background task runs the transport's serve loop for the listener's
//! lifetime. Sessions that reach the forward-secure state are queued, and
//! `accept` takes them in order. Concurrent `accept` calls are served one at a
//! time from the same queue.
//!
//! Closing the listener wakes every pending `accept` with
//! [`Error::ListenerClosed`]. Sessions still queued are closed, as is a
//! session whose `accept` future is dropped before its send stream opens.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    config::ListenerConfig,
    conn::Conn,
    error::{Error, Result},
    handshake::{self, HandshakeNotifier, Readiness},
    transport::{Session, TransportListener},
};

/// Accepts connections from a transport listener.
pub struct Listener<L: TransportListener> {
    transport: Arc<L>,
    local_addr: SocketAddr,
    ready: Mutex<mpsc::Receiver<Readiness<L::Session>>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl<L: TransportListener> Listener<L> {
    /// Start serving `transport`, which listens on `local_addr`.
    ///
    /// Spawns the serve loop, so this must run inside a Tokio runtime.
    pub fn start(transport: L, local_addr: SocketAddr, config: &ListenerConfig) -> Self {
        let transport = Arc::new(transport);
        let (notifier, ready) = handshake::channel(config.accept_backlog);
        let shutdown = CancellationToken::new();

        tokio::spawn(serve_loop(Arc::clone(&transport), notifier, shutdown.clone()));
        debug!(%local_addr, backlog = config.accept_backlog, "listener serving");

        Self {
            transport,
            local_addr,
            ready: Mutex::new(ready),
            shutdown,
            closed: AtomicBool::new(false),
        }
    }

    /// Wait for the next session to complete its handshake.
    ///
    /// Opens the send stream on the session before returning it. Handshake
    /// and serve-loop failures are returned as they arrive; retrying is up to
    /// the caller.
    pub async fn accept(&self) -> Result<Conn<L::Session>> {
        let next = {
            let mut ready = self.ready.lock().await;
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    discard_ready(&mut ready);
                    return Err(Error::ListenerClosed);
                },
                next = ready.recv() => next,
            }
        };

        match next {
            Some(Ok(session)) => {
                let guard = CloseOnDrop(Some(session.clone()));
                let conn = Conn::establish(session).await;
                guard.disarm();
                conn
            },
            Some(Err(source)) => Err(Error::Handshake(source)),
            None => Err(Error::ListenerClosed),
        }
    }

    /// Close the transport listener and wake pending `accept` calls.
    ///
    /// Only the first call reaches the transport.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shutdown.cancel();
        // A pending accept holds the lock and drains once it sees the cancel
        if let Ok(mut ready) = self.ready.try_lock() {
            discard_ready(&mut ready);
        }
        self.transport.close().map_err(Error::Close)?;
        debug!(local = %self.local_addr, "listener closed");
        Ok(())
    }

    /// Address of the bound datagram socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl<L: TransportListener> fmt::Debug for Listener<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<L: TransportListener> Drop for Listener<L> {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!(%error, "failed to close listener on drop");
        }
        discard_ready(self.ready.get_mut());
    }
}

/// Stop the queue and close every session still waiting in it.
///
/// Handshakes completing afterwards get their session back from
/// [`PendingHandshake::complete`](crate::PendingHandshake::complete).
fn discard_ready<S: Session>(ready: &mut mpsc::Receiver<Readiness<S>>) {
    ready.close();
    while let Ok(next) = ready.try_recv() {
        if let Ok(session) = next {
            debug!(remote = ?session.remote_addr(), "closing session queued at listener close");
            if let Err(error) = session.close() {
                warn!(%error, "failed to close queued session");
            }
        }
    }
}

/// Closes a dequeued session unless `accept` finished with it.
struct CloseOnDrop<S: Session>(Option<S>);

impl<S: Session> CloseOnDrop<S> {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl<S: Session> Drop for CloseOnDrop<S> {
    fn drop(&mut self) {
        if let Some(session) = self.0.take() {
            debug!(remote = ?session.remote_addr(), "accept cancelled, closing session");
            if let Err(error) = session.close() {
                warn!(%error, "failed to close session of cancelled accept");
            }
        }
    }
}

async fn serve_loop<L: TransportListener>(
    transport: Arc<L>,
    notifier: HandshakeNotifier<L::Session>,
    shutdown: CancellationToken,
) {
    let result = tokio::select! {
        () = shutdown.cancelled() => return,
        result = transport.serve(notifier.clone()) => result,
    };

    match result {
        Ok(()) => debug!("serve loop finished"),
        Err(error) => {
            if !notifier.fail(error).await {
                debug!("serve loop failed after listener was dropped");
            }
        },
    }
}
