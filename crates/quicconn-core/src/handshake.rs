//! Handshake synchronization between a transport's serve loop and `accept`.
//!
//! Transports report handshake progress asynchronously, from whatever task
//! runs their accept loop. `Listener::accept` wants a single ready session.
//! The two are joined by a bounded queue:
//!
//! ```text
//! serve loop ── track() ──> PendingHandshake ── advance(Initial..Secure)
//!                                  │
//!                                  └── complete(session) ──> [ready queue] ──> accept()
//! ```
//!
//! Only [`PendingHandshake::complete`] puts anything on the queue, and it
//! consumes the handle, so every session is delivered at most once. The queue
//! holds at least one entry: a session that becomes ready while nobody is
//! accepting waits in the queue instead of being dropped.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Handshake progress of an incoming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandshakeState {
    /// First packet seen, nothing negotiated yet
    Initial,
    /// Protocol version agreed
    VersionNegotiated,
    /// Handshake keys installed, peer parameters known
    Secure,
    /// Handshake confirmed, application data is authenticated
    ForwardSecure,
}

/// Outcome of one incoming session, as seen by `accept`.
pub(crate) type Readiness<S> = io::Result<S>;

/// Create a notifier and the queue it feeds.
///
/// `backlog` is clamped to at least one slot.
pub(crate) fn channel<S>(backlog: usize) -> (HandshakeNotifier<S>, mpsc::Receiver<Readiness<S>>) {
    let (tx, rx) = mpsc::channel(backlog.max(1));
    (HandshakeNotifier { ready: tx, next_id: Arc::new(AtomicU64::new(1)) }, rx)
}

/// Handed to [`TransportListener::serve`](crate::TransportListener::serve).
///
/// Cloneable, so a serve loop can move a copy into every per-session task.
pub struct HandshakeNotifier<S> {
    ready: mpsc::Sender<Readiness<S>>,
    next_id: Arc<AtomicU64>,
}

impl<S> Clone for HandshakeNotifier<S> {
    fn clone(&self) -> Self {
        Self { ready: self.ready.clone(), next_id: Arc::clone(&self.next_id) }
    }
}

impl<S> std::fmt::Debug for HandshakeNotifier<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeNotifier").field("closed", &self.ready.is_closed()).finish()
    }
}

impl<S: Send + 'static> HandshakeNotifier<S> {
    /// Start tracking a newly seen incoming session.
    pub fn track(&self) -> PendingHandshake<S> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(session = id, "tracking incoming session");

        PendingHandshake {
            id,
            state: HandshakeState::Initial,
            ready: self.ready.clone(),
            finished: false,
        }
    }

    /// Report a failure of the accept loop itself.
    ///
    /// The next `accept` returns it. Returns `false` if the listener is gone.
    pub async fn fail(&self, error: io::Error) -> bool {
        debug!(%error, "serve loop failed");
        self.ready.send(Err(error)).await.is_ok()
    }

    /// Whether the listener side has gone away.
    pub fn is_closed(&self) -> bool {
        self.ready.is_closed()
    }
}

/// Handshake progress of one incoming session.
///
/// Consumed by [`complete`](Self::complete) or [`fail`](Self::fail).
pub struct PendingHandshake<S> {
    id: u64,
    state: HandshakeState,
    ready: mpsc::Sender<Readiness<S>>,
    finished: bool,
}

impl<S> std::fmt::Debug for PendingHandshake<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingHandshake")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S: Send + 'static> PendingHandshake<S> {
    /// Identifier of this session, unique per listener.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Last reported state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Record an intermediate state change.
    ///
    /// Never wakes `accept`. Repeating the current state is a no-op, earlier
    /// states are ignored, and [`HandshakeState::ForwardSecure`] must be reported through
    /// [`complete`](Self::complete), which carries the session.
    pub fn advance(&mut self, state: HandshakeState) {
        if state == HandshakeState::ForwardSecure {
            warn!(session = self.id, "forward-secure reported without a session, ignoring");
            return;
        }
        if state == self.state {
            return;
        }
        if state < self.state {
            trace!(session = self.id, ?state, current = ?self.state, "stale handshake state");
            return;
        }

        trace!(session = self.id, ?state, "handshake progress");
        self.state = state;
    }

    /// Report the forward-secure transition and queue `session` for `accept`.
    ///
    /// Waits for a free slot if the backlog is full. Returns the session back
    /// if the listener has gone away, so the transport can close it.
    pub async fn complete(mut self, session: S) -> Result<(), S> {
        self.state = HandshakeState::ForwardSecure;
        self.finished = true;

        match self.ready.send(Ok(session)).await {
            Ok(()) => {
                debug!(session = self.id, "session forward-secure, queued for accept");
                Ok(())
            },
            Err(mpsc::error::SendError(rejected)) => {
                debug!(session = self.id, "listener gone, rejecting ready session");
                match rejected {
                    Ok(session) => Err(session),
                    Err(_) => Ok(()),
                }
            },
        }
    }

    /// Report that the handshake failed.
    ///
    /// The error is returned by the next `accept`.
    pub async fn fail(mut self, error: io::Error) {
        self.finished = true;
        debug!(session = self.id, state = ?self.state, %error, "handshake failed");

        if self.ready.send(Err(error)).await.is_err() {
            trace!(session = self.id, "listener gone, dropping handshake failure");
        }
    }
}

impl<S> Drop for PendingHandshake<S> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(session = self.id, state = ?self.state, "handshake abandoned");
        }
    }
}
