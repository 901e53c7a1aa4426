//! Connection adapter: one secure session presented as one byte stream.
//!
//! # Stream lifecycle
//!
//! ```text
//! establish ──> open_stream() ──> send stream (write-only, eager)
//!
//! first read ──> accept_stream() ──> receive stream (read-only, cached)
//!                      │
//!                      └── error: nothing cached, next read accepts again
//! ```
//!
//! Each side writes on the stream it opened and reads the stream the peer
//! opened, so the two directions never share a stream. Only one accept is in
//! flight at a time and a connection never holds more than one receive
//! stream.
//!
//! # Concurrency
//!
//! `Conn` implements [`AsyncRead`] and [`AsyncWrite`] and adds no locking of
//! its own. Use [`tokio::io::split`] for one concurrent reader and one
//! concurrent writer.
//!
//! A read waiting on the peer is cancelled by closing the session. Take a
//! [`Closer`] before handing the connection to a reader; closing through it
//! fails the pending read with the transport's error.

use std::{
    fmt,
    io,
    net::SocketAddr,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll, ready},
    time::Instant,
};

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::{debug, trace, warn};

use crate::{
    error::{Error, Result},
    transport::Session,
};

/// Receive side of a connection.
enum RecvState<S: Session> {
    /// No stream yet, no accept in flight
    Idle,
    /// Waiting for the peer to open its stream
    Accepting(BoxFuture<'static, io::Result<S::RecvStream>>),
    /// Peer stream accepted and cached
    Ready(S::RecvStream),
}

impl<S: Session> RecvState<S> {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Accepting(_) => "accepting",
            Self::Ready(_) => "ready",
        }
    }
}

/// A single bidirectional byte stream over a secure multiplexed session.
pub struct Conn<S: Session> {
    session: S,
    send: S::SendStream,
    recv: RecvState<S>,
    closed: Arc<AtomicBool>,
}

impl<S: Session> Conn<S> {
    /// Wrap a session whose handshake has completed.
    ///
    /// Opens the send stream immediately, so a session that cannot carry
    /// streams fails here rather than on first write. On failure the session
    /// is closed and no connection is produced.
    pub async fn establish(session: S) -> Result<Self> {
        let send = match session.open_stream().await {
            Ok(send) => send,
            Err(source) => {
                if let Err(error) = session.close() {
                    warn!(%error, "failed to close session after open failure");
                }
                return Err(Error::OpenStream(source));
            },
        };

        debug!(
            local = ?session.local_addr(),
            remote = ?session.remote_addr(),
            "connection established"
        );

        let closed = Arc::new(AtomicBool::new(false));
        Ok(Self { session, send, recv: RecvState::Idle, closed })
    }

    /// Local address reported by the session.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session.local_addr()
    }

    /// Remote address reported by the session.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.session.remote_addr()
    }

    /// Whether the peer's stream has been accepted.
    pub fn has_receive_stream(&self) -> bool {
        matches!(self.recv, RecvState::Ready(_))
    }

    /// Handle that closes this connection without borrowing it.
    pub fn closer(&self) -> Closer<S> {
        Closer { session: self.session.clone(), closed: Arc::clone(&self.closed) }
    }

    /// Close the connection.
    ///
    /// Drops the receive stream, finishes the send stream and closes the
    /// session. A second call, or a call after a [`Closer`] fired, does
    /// nothing. Pending reads and writes on other halves fail with the
    /// transport's error. Data the peer has not yet acknowledged may be
    /// discarded; use [`AsyncWriteExt::shutdown`] and wait for the peer's end
    /// of stream when delivery matters.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.recv = RecvState::Idle;

        if let Err(error) = self.send.shutdown().await {
            trace!(%error, "send stream already finished");
        }

        self.closer().close()
    }

    /// Accepted for stream-socket compatibility. Deadlines are not enforced.
    pub fn set_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        trace!(?deadline, "ignoring deadline");
        Ok(())
    }

    /// Accepted for stream-socket compatibility. Deadlines are not enforced.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        trace!(?deadline, "ignoring read deadline");
        Ok(())
    }

    /// Accepted for stream-socket compatibility. Deadlines are not enforced.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        trace!(?deadline, "ignoring write deadline");
        Ok(())
    }
}

impl<S: Session> fmt::Debug for Conn<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("local", &self.session.local_addr())
            .field("remote", &self.session.remote_addr())
            .field("recv", &self.recv.name())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

/// Closes a [`Conn`] from anywhere, including while another task or thread
/// is blocked reading it.
///
/// Clones share the connection's closed flag, so the session is closed once
/// no matter how many handles fire.
pub struct Closer<S: Session> {
    session: S,
    closed: Arc<AtomicBool>,
}

impl<S: Session> Closer<S> {
    /// Close the session. Only the first close of the connection reaches the
    /// transport.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.session.close().map_err(Error::Close)?;
        debug!(remote = ?self.session.remote_addr(), "connection closed");
        Ok(())
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<S: Session> Clone for Closer<S> {
    fn clone(&self) -> Self {
        Self { session: self.session.clone(), closed: Arc::clone(&self.closed) }
    }
}

impl<S: Session> fmt::Debug for Closer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closer")
            .field("remote", &self.session.remote_addr())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<S: Session> AsyncRead for Conn<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            match &mut this.recv {
                RecvState::Ready(stream) => return Pin::new(stream).poll_read(cx, buf),
                RecvState::Accepting(accept) => match ready!(accept.as_mut().poll(cx)) {
                    Ok(stream) => {
                        debug!(remote = ?this.session.remote_addr(), "accepted receive stream");
                        this.recv = RecvState::Ready(stream);
                    },
                    Err(source) => {
                        this.recv = RecvState::Idle;
                        return Poll::Ready(Err(Error::AcceptStream(source).into()));
                    },
                },
                RecvState::Idle => {
                    let session = this.session.clone();
                    this.recv =
                        RecvState::Accepting(Box::pin(async move { session.accept_stream().await }));
                },
            }
        }
    }
}

impl<S: Session> AsyncWrite for Conn<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().send).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().send).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().send).poll_shutdown(cx)
    }
}
