//! In-memory session double.
//!
//! Streams are [`DuplexStream`] pipes. A [`MockSession::pair`] links two
//! sessions so that a stream opened on one side shows up in the other side's
//! accept queue, which is enough to run real traffic through two `Conn`s.
//! An unpaired session keeps the far ends of opened streams for inspection and
//! accepts only what a test pushes into it.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use quicconn_core::Session;
use tokio::{
    io::{AsyncWriteExt, DuplexStream},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

/// Buffer size of each in-memory stream.
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// Failure injected into a mock operation.
pub(crate) type Injected = Mutex<Option<(io::ErrorKind, String)>>;

pub(crate) fn injected_error(slot: &Injected) -> Option<io::Error> {
    slot.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(|(kind, message)| io::Error::new(*kind, message.clone()))
}

pub(crate) fn inject(slot: &Injected, value: Option<(io::ErrorKind, String)>) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

struct Inner {
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
    incoming_tx: mpsc::UnboundedSender<DuplexStream>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<DuplexStream>>,
    peer: Option<mpsc::UnboundedSender<DuplexStream>>,
    opened: Mutex<Vec<DuplexStream>>,
    open_error: Injected,
    accept_error: Injected,
    close_error: Injected,
    open_stalled: AtomicBool,
    open_calls: AtomicUsize,
    accept_calls: AtomicUsize,
    close_calls: AtomicUsize,
    closed: CancellationToken,
}

/// Session double with injectable failures and call counters.
#[derive(Clone)]
pub struct MockSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession")
            .field("local_addr", &self.inner.local_addr)
            .field("remote_addr", &self.inner.remote_addr)
            .field("closed", &self.inner.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl MockSession {
    /// Unpaired session that reports no addresses.
    pub fn new() -> Self {
        Self::with_addrs(None, None)
    }

    /// Unpaired session reporting the given addresses.
    pub fn with_addrs(local_addr: Option<SocketAddr>, remote_addr: Option<SocketAddr>) -> Self {
        Self::build(local_addr, remote_addr, None, CancellationToken::new())
    }

    /// Two linked sessions: streams opened on one are accepted on the other.
    ///
    /// Closing either side closes both.
    pub fn pair(a_addr: SocketAddr, b_addr: SocketAddr) -> (Self, Self) {
        let closed = CancellationToken::new();
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        let a = Self::from_parts(
            Some(a_addr),
            Some(b_addr),
            a_tx.clone(),
            a_rx,
            Some(b_tx.clone()),
            closed.clone(),
        );
        let b = Self::from_parts(Some(b_addr), Some(a_addr), b_tx, b_rx, Some(a_tx), closed);
        (a, b)
    }

    fn build(
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
        peer: Option<mpsc::UnboundedSender<DuplexStream>>,
        closed: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::from_parts(local_addr, remote_addr, tx, rx, peer, closed)
    }

    fn from_parts(
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
        incoming_tx: mpsc::UnboundedSender<DuplexStream>,
        incoming_rx: mpsc::UnboundedReceiver<DuplexStream>,
        peer: Option<mpsc::UnboundedSender<DuplexStream>>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                local_addr,
                remote_addr,
                incoming_tx,
                incoming_rx: tokio::sync::Mutex::new(incoming_rx),
                peer,
                opened: Mutex::new(Vec::new()),
                open_error: Mutex::new(None),
                accept_error: Mutex::new(None),
                close_error: Mutex::new(None),
                open_stalled: AtomicBool::new(false),
                open_calls: AtomicUsize::new(0),
                accept_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
                closed,
            }),
        }
    }

    /// Make every `open_stream` fail with this error.
    pub fn fail_open(&self, kind: io::ErrorKind, message: &str) {
        inject(&self.inner.open_error, Some((kind, message.to_string())));
    }

    /// Make `open_stream` wait until the session is closed, then fail.
    pub fn stall_open(&self) {
        self.inner.open_stalled.store(true, Ordering::SeqCst);
    }

    /// Make every `accept_stream` fail with this error.
    pub fn fail_accept(&self, kind: io::ErrorKind, message: &str) {
        inject(&self.inner.accept_error, Some((kind, message.to_string())));
    }

    /// Let `accept_stream` succeed again.
    pub fn clear_accept_failure(&self) {
        inject(&self.inner.accept_error, None);
    }

    /// Make `close` fail with this error.
    pub fn fail_close(&self, kind: io::ErrorKind, message: &str) {
        inject(&self.inner.close_error, Some((kind, message.to_string())));
    }

    /// Queue a peer stream carrying `data` followed by end of stream.
    pub async fn push_incoming(&self, data: &[u8]) -> io::Result<()> {
        let (mut writer, reader) = tokio::io::duplex(data.len().max(1));
        writer.write_all(data).await?;
        writer.shutdown().await?;
        self.push_stream(reader);
        Ok(())
    }

    /// Queue an open peer stream and return its writing end.
    pub fn push_incoming_stream(&self) -> DuplexStream {
        let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        self.push_stream(reader);
        writer
    }

    fn push_stream(&self, stream: DuplexStream) {
        // The receiver lives in `inner`, so this cannot fail while `self` exists
        let _ = self.inner.incoming_tx.send(stream);
    }

    /// Far ends of streams opened on an unpaired session.
    pub fn take_opened(&self) -> Vec<DuplexStream> {
        std::mem::take(&mut *self.inner.opened.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of `open_stream` calls.
    pub fn open_calls(&self) -> usize {
        self.inner.open_calls.load(Ordering::SeqCst)
    }

    /// Number of `accept_stream` calls.
    pub fn accept_calls(&self) -> usize {
        self.inner.accept_calls.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Wait until the session is closed.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    fn closed_error() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionAborted, "session closed")
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for MockSession {
    type SendStream = DuplexStream;
    type RecvStream = DuplexStream;

    async fn open_stream(&self) -> io::Result<DuplexStream> {
        self.inner.open_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = injected_error(&self.inner.open_error) {
            return Err(error);
        }
        if self.inner.open_stalled.load(Ordering::SeqCst) {
            self.inner.closed.cancelled().await;
        }
        if self.is_closed() {
            return Err(Self::closed_error());
        }

        let (local, far) = tokio::io::duplex(PIPE_CAPACITY);
        match &self.inner.peer {
            Some(peer) => peer.send(far).map_err(|_| Self::closed_error())?,
            None => self.inner.opened.lock().unwrap_or_else(PoisonError::into_inner).push(far),
        }
        Ok(local)
    }

    async fn accept_stream(&self) -> io::Result<DuplexStream> {
        self.inner.accept_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = injected_error(&self.inner.accept_error) {
            return Err(error);
        }

        let mut incoming = self.inner.incoming_rx.lock().await;
        tokio::select! {
            () = self.inner.closed.cancelled() => Err(Self::closed_error()),
            stream = incoming.recv() => stream.ok_or_else(Self::closed_error),
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

    fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }
}
