//! In-memory transport double with scripted handshakes.
//!
//! [`MockTransport::listen`] keeps the bound socket (so the port stays taken)
//! and registers the listener; [`MockTransport::dial`] then pairs a client
//! session with a server session and pushes the server side through the
//! listener's handshake script. Tests drive the listener directly with
//! [`MockListener::push`] when they need a specific sequence of handshake
//! reports.

use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use quicconn_core::{HandshakeNotifier, HandshakeState, Session, Transport, TransportListener};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::session::{Injected, MockSession, inject, injected_error};

/// One report made by the mock listener for an incoming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Report an intermediate state
    Advance(HandshakeState),
    /// Report forward-secure and hand the session over
    Complete,
    /// Report a handshake failure
    Fail(io::ErrorKind, String),
}

impl HandshakeStep {
    /// Every state after `Initial` in order, ending forward-secure.
    pub fn full() -> Vec<Self> {
        vec![
            Self::Advance(HandshakeState::VersionNegotiated),
            Self::Advance(HandshakeState::Secure),
            Self::Complete,
        ]
    }

    /// Progress that never reaches forward-secure.
    pub fn stalled() -> Vec<Self> {
        vec![
            Self::Advance(HandshakeState::VersionNegotiated),
            Self::Advance(HandshakeState::Secure),
        ]
    }

    /// Progress followed by a failure.
    pub fn failing(kind: io::ErrorKind, message: &str) -> Vec<Self> {
        vec![
            Self::Advance(HandshakeState::VersionNegotiated),
            Self::Fail(kind, message.to_string()),
        ]
    }
}

enum Event {
    Incoming(MockSession, Vec<HandshakeStep>),
    ServeFailure(io::ErrorKind, String),
}

struct ListenerInner {
    socket: UdpSocket,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>,
    close_error: Injected,
    close_calls: AtomicUsize,
    closed: CancellationToken,
}

/// Listener double. Clones share state, so a test can keep a handle to the
/// listener the adapter owns.
#[derive(Clone)]
pub struct MockListener {
    inner: Arc<ListenerInner>,
}

impl std::fmt::Debug for MockListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockListener")
            .field("local_addr", &self.inner.socket.local_addr().ok())
            .field("closed", &self.inner.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl MockListener {
    /// Listener on an already bound socket.
    pub fn new(socket: UdpSocket) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ListenerInner {
                socket,
                events_tx,
                events_rx: tokio::sync::Mutex::new(events_rx),
                close_error: Mutex::new(None),
                close_calls: AtomicUsize::new(0),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Address of the socket the listener holds.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }

    /// Deliver an incoming session, reported with `script` once served.
    pub fn push(&self, session: MockSession, script: Vec<HandshakeStep>) {
        self.send(Event::Incoming(session, script));
    }

    /// Make the running serve loop fail with this error.
    pub fn fail_serve(&self, kind: io::ErrorKind, message: &str) {
        self.send(Event::ServeFailure(kind, message.to_string()));
    }

    /// Make `close` fail with this error.
    pub fn fail_close(&self, kind: io::ErrorKind, message: &str) {
        inject(&self.inner.close_error, Some((kind, message.to_string())));
    }

    /// Number of `close` calls.
    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    /// Whether `close` has succeeded.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    fn send(&self, event: Event) {
        // The receiver lives in `inner`
        let _ = self.inner.events_tx.send(event);
    }
}

#[async_trait]
impl TransportListener for MockListener {
    type Session = MockSession;

    async fn serve(&self, notifier: HandshakeNotifier<MockSession>) -> io::Result<()> {
        let mut events = self.inner.events_rx.lock().await;

        loop {
            let event = tokio::select! {
                () = self.inner.closed.cancelled() => return Ok(()),
                event = events.recv() => event,
            };

            match event {
                Some(Event::Incoming(session, script)) => {
                    tokio::spawn(run_handshake(notifier.clone(), session, script));
                },
                Some(Event::ServeFailure(kind, message)) => {
                    return Err(io::Error::new(kind, message));
                },
                None => return Ok(()),
            }
        }
    }

    fn close(&self) -> io::Result<()> {
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = injected_error(&self.inner.close_error) {
            return Err(error);
        }
        self.inner.closed.cancel();
        Ok(())
    }
}

async fn run_handshake(
    notifier: HandshakeNotifier<MockSession>,
    session: MockSession,
    script: Vec<HandshakeStep>,
) {
    let mut pending = notifier.track();

    for step in script {
        // Reports arrive from a different task than accept, one at a time
        tokio::task::yield_now().await;

        match step {
            HandshakeStep::Advance(state) => pending.advance(state),
            HandshakeStep::Complete => {
                if let Err(rejected) = pending.complete(session).await {
                    if let Err(error) = rejected.close() {
                        warn!(%error, "failed to close rejected session");
                    }
                }
                return;
            },
            HandshakeStep::Fail(kind, message) => {
                pending.fail(io::Error::new(kind, message)).await;
                return;
            },
        }
    }

    trace!(session = pending.id(), "handshake script ended without an outcome");
}

#[derive(Default)]
struct TransportInner {
    dial_error: Injected,
    listen_error: Injected,
    dials: Mutex<Vec<(SocketAddr, String)>>,
    listener: Mutex<Option<MockListener>>,
    handshake: Mutex<Option<Vec<HandshakeStep>>>,
}

/// Transport double. Clones share state.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<TransportInner>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport").finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Transport with no failures and full handshakes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `dial` fail with this error.
    pub fn fail_dial(&self, kind: io::ErrorKind, message: &str) {
        inject(&self.inner.dial_error, Some((kind, message.to_string())));
    }

    /// Make every `listen` fail with this error.
    pub fn fail_listen(&self, kind: io::ErrorKind, message: &str) {
        inject(&self.inner.listen_error, Some((kind, message.to_string())));
    }

    /// Script used for the server side of dialed sessions.
    ///
    /// Defaults to [`HandshakeStep::full`].
    pub fn set_handshake(&self, script: Vec<HandshakeStep>) {
        *self.inner.handshake.lock().unwrap_or_else(PoisonError::into_inner) = Some(script);
    }

    /// Remote address and server name of every dial, in order.
    pub fn dials(&self) -> Vec<(SocketAddr, String)> {
        self.inner.dials.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Most recently started listener.
    pub fn listener(&self) -> Option<MockListener> {
        self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn handshake(&self) -> Vec<HandshakeStep> {
        self.inner
            .handshake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(HandshakeStep::full)
    }
}

/// Client address reported by dialed sessions.
fn client_addr(remote: SocketAddr) -> SocketAddr {
    let mut addr = remote;
    addr.set_port(if remote.port() == 50_000 { 50_001 } else { 50_000 });
    addr
}

#[async_trait]
impl Transport for MockTransport {
    type Session = MockSession;
    type Listener = MockListener;

    async fn dial(&self, remote: SocketAddr, server_name: &str) -> io::Result<MockSession> {
        self.inner
            .dials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((remote, server_name.to_string()));
        if let Some(error) = injected_error(&self.inner.dial_error) {
            return Err(error);
        }

        let listener = self.listener().filter(|listener| listener.local_addr().ok() == Some(remote));
        match listener {
            Some(listener) => {
                let (client, server) = MockSession::pair(client_addr(remote), remote);
                listener.push(server, self.handshake());
                debug!(%remote, "mock dial paired with listener");
                Ok(client)
            },
            // Nobody listening: a standalone session the test can inspect
            None => Ok(MockSession::with_addrs(Some(client_addr(remote)), Some(remote))),
        }
    }

    async fn listen(&self, socket: UdpSocket) -> io::Result<MockListener> {
        if let Some(error) = injected_error(&self.inner.listen_error) {
            return Err(error);
        }

        let listener = MockListener::new(socket);
        *self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener.clone());
        Ok(listener)
    }
}
