//! Blocking facade for callers outside async code.
//!
//! ```text
//!  Caller thread (blocking)
//!       │
//!  Endpoint::dial() / listen() / Listener::accept() / Conn::read()
//!       │  rt.block_on(...)
//!       ▼
//!  tokio Runtime (owned by Endpoint, shared by everything it creates)
//!       └── Listener serve loops
//! ```
//!
//! Everything delegates to the async [`Conn`](crate::Conn) and
//! [`Listener`](crate::Listener), adding only the runtime and `block_on`.
//! None of these methods may be called from inside an async context.
//!
//! [`Conn`] implements [`std::io::Read`] and [`std::io::Write`], so it drops
//! into code written for `TcpStream`. For one reader thread and one writer
//! thread, [`Conn::split`] it.
//!
//! A blocked read returns only when data arrives or the connection closes.
//! To release it from another thread, close through a [`Closer`] taken from
//! the connection or from either half.

use std::{
    io::{self, Read, Write},
    net::SocketAddr,
    sync::Arc,
    time::Instant,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    runtime::Runtime,
};

pub use crate::conn::Closer;
use crate::{
    config::ListenerConfig,
    error::Result,
    transport::{Session, Transport, TransportListener},
};

/// Entry point for blocking dial and listen over one transport.
pub struct Endpoint<T: Transport> {
    transport: Arc<T>,
    rt: Arc<Runtime>,
}

impl<T: Transport> Endpoint<T> {
    /// Create an endpoint with its own multi-threaded runtime.
    pub fn new(transport: T) -> io::Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("quicconn")
            .build()?;
        Ok(Self::with_runtime(transport, Arc::new(rt)))
    }

    /// Create an endpoint on an existing runtime.
    ///
    /// The runtime must have I/O and time drivers enabled and, for the serve
    /// loop to make progress while a caller blocks, worker threads.
    pub fn with_runtime(transport: T, rt: Arc<Runtime>) -> Self {
        Self { transport: Arc::new(transport), rt }
    }

    /// Blocking [`dial`](crate::dial).
    pub fn dial(&self, network: &str, addr: &str) -> Result<Conn<T::Session>> {
        let inner = self.rt.block_on(crate::dial(&*self.transport, network, addr))?;
        Ok(Conn { inner, rt: Arc::clone(&self.rt) })
    }

    /// Blocking [`listen`](crate::listen).
    pub fn listen(&self, network: &str, addr: &str) -> Result<Listener<T::Listener>> {
        self.listen_with_config(network, addr, &ListenerConfig::default())
    }

    /// Blocking [`listen_with_config`](crate::listen_with_config).
    pub fn listen_with_config(
        &self,
        network: &str,
        addr: &str,
        config: &ListenerConfig,
    ) -> Result<Listener<T::Listener>> {
        let inner = self.rt.block_on(crate::listen_with_config(
            &*self.transport,
            network,
            addr,
            config,
        ))?;
        Ok(Listener { inner, rt: Arc::clone(&self.rt) })
    }
}

/// Blocking listener.
pub struct Listener<L: TransportListener> {
    inner: crate::Listener<L>,
    rt: Arc<Runtime>,
}

impl<L: TransportListener> Listener<L> {
    /// Block until the next session completes its handshake.
    pub fn accept(&self) -> Result<Conn<L::Session>> {
        let inner = self.rt.block_on(self.inner.accept())?;
        Ok(Conn { inner, rt: Arc::clone(&self.rt) })
    }

    /// Close the listener. Blocked `accept` calls on other threads return
    /// [`Error::ListenerClosed`](crate::Error::ListenerClosed).
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    /// Address of the bound datagram socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }
}

/// Blocking connection.
pub struct Conn<S: Session> {
    inner: crate::Conn<S>,
    rt: Arc<Runtime>,
}

impl<S: Session> Conn<S> {
    /// Local address reported by the session.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    /// Remote address reported by the session.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr()
    }

    /// Finish the send stream; the peer reads end of stream.
    pub fn shutdown(&mut self) -> io::Result<()> {
        self.rt.block_on(self.inner.shutdown())
    }

    /// Close the connection. See [`crate::Conn::close`].
    pub fn close(&mut self) -> Result<()> {
        self.rt.block_on(self.inner.close())
    }

    /// Handle for closing this connection from another thread.
    pub fn closer(&self) -> Closer<S> {
        self.inner.closer()
    }

    /// Accepted for stream-socket compatibility. Deadlines are not enforced.
    pub fn set_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.inner.set_deadline(deadline)
    }

    /// Accepted for stream-socket compatibility. Deadlines are not enforced.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.inner.set_read_deadline(deadline)
    }

    /// Accepted for stream-socket compatibility. Deadlines are not enforced.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.inner.set_write_deadline(deadline)
    }

    /// Split into halves that can be used from two threads.
    ///
    /// Both halves can close the connection; closing wakes a read blocked in
    /// the other half.
    pub fn split(self) -> (ReadHalf<S>, WriteHalf<S>) {
        let closer = self.inner.closer();
        let (read, write) = tokio::io::split(self.inner);
        let reader = ReadHalf { inner: read, closer: closer.clone(), rt: Arc::clone(&self.rt) };
        (reader, WriteHalf { inner: write, closer, rt: self.rt })
    }
}

impl<S: Session> Read for Conn<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.rt.block_on(self.inner.read(buf))
    }
}

impl<S: Session> Write for Conn<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.rt.block_on(self.inner.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.rt.block_on(self.inner.flush())
    }
}

/// Read half of a split blocking connection.
pub struct ReadHalf<S: Session> {
    inner: tokio::io::ReadHalf<crate::Conn<S>>,
    closer: Closer<S>,
    rt: Arc<Runtime>,
}

impl<S: Session> ReadHalf<S> {
    /// Close the connection, failing any write pending on the other half.
    pub fn close(&self) -> Result<()> {
        self.closer.close()
    }

    /// Handle for closing the connection from another thread.
    pub fn closer(&self) -> Closer<S> {
        self.closer.clone()
    }
}

impl<S: Session> Read for ReadHalf<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.rt.block_on(self.inner.read(buf))
    }
}

/// Write half of a split blocking connection.
pub struct WriteHalf<S: Session> {
    inner: tokio::io::WriteHalf<crate::Conn<S>>,
    closer: Closer<S>,
    rt: Arc<Runtime>,
}

impl<S: Session> WriteHalf<S> {
    /// Finish the send stream; the peer reads end of stream.
    pub fn shutdown(&mut self) -> io::Result<()> {
        self.rt.block_on(self.inner.shutdown())
    }

    /// Close the connection, waking a read blocked on the other half.
    pub fn close(&self) -> Result<()> {
        self.closer.close()
    }

    /// Handle for closing the connection from another thread.
    pub fn closer(&self) -> Closer<S> {
        self.closer.clone()
    }
}

impl<S: Session> Write for WriteHalf<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.rt.block_on(self.inner.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.rt.block_on(self.inner.flush())
    }
}
