//! Connection adapter tests
//!
//! Drive `Conn` over in-memory sessions: stream lifecycle, addresses, close
//! and error propagation.

use std::{io, net::SocketAddr, time::Duration};

use quicconn_core::{Conn, Error};
use quicconn_harness::MockSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

#[tokio::test]
async fn establish_opens_send_stream() {
    let session = MockSession::new();
    let conn = Conn::establish(session.clone()).await.unwrap();

    assert_eq!(session.open_calls(), 1);
    assert_eq!(session.accept_calls(), 0);
    assert!(!conn.has_receive_stream());
}

#[tokio::test]
async fn write_goes_to_opened_stream() {
    let session = MockSession::new();
    let mut conn = Conn::establish(session.clone()).await.unwrap();

    conn.write_all(b"hello ").await.unwrap();
    conn.write_all(b"world").await.unwrap();
    conn.shutdown().await.unwrap();

    let mut far = session.take_opened().pop().unwrap();
    let mut received = Vec::new();
    far.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"hello world");
}

#[tokio::test]
async fn read_waits_for_peer_stream() {
    let session = MockSession::new();
    let mut conn = Conn::establish(session.clone()).await.unwrap();
    let mut buf = [0u8; 5];

    // Nothing opened by the peer yet
    let pending = tokio::time::timeout(Duration::from_millis(50), conn.read(&mut buf)).await;
    assert!(pending.is_err());
    assert!(!conn.has_receive_stream());

    session.push_incoming(b"hello").await.unwrap();
    conn.read_exact(&mut buf).await.unwrap();

    assert_eq!(&buf, b"hello");
    assert!(conn.has_receive_stream());
    // The interrupted read's accept was resumed, not restarted
    assert_eq!(session.accept_calls(), 1);
}

#[tokio::test]
async fn receive_stream_is_accepted_once() {
    let session = MockSession::new();
    let mut conn = Conn::establish(session.clone()).await.unwrap();

    session.push_incoming(b"first").await.unwrap();
    session.push_incoming(b"second").await.unwrap();

    let mut received = Vec::new();
    conn.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"first");

    // Cached stream is at end of stream; the second peer stream is never taken
    let mut buf = [0u8; 16];
    assert_eq!(conn.read(&mut buf).await.unwrap(), 0);
    assert_eq!(session.accept_calls(), 1);
}

#[tokio::test]
async fn failed_accept_is_retried_on_next_read() {
    let session = MockSession::new();
    let mut conn = Conn::establish(session.clone()).await.unwrap();
    let mut buf = [0u8; 5];

    session.fail_accept(io::ErrorKind::ConnectionReset, "peer reset");
    let err = conn.read(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    assert_eq!(err.to_string(), "accept stream: peer reset");
    assert!(!conn.has_receive_stream());

    session.clear_accept_failure();
    session.push_incoming(b"again").await.unwrap();
    conn.read_exact(&mut buf).await.unwrap();

    assert_eq!(&buf, b"again");
    assert_eq!(session.accept_calls(), 2);
}

#[tokio::test]
async fn pending_read_fails_when_session_closes() {
    use quicconn_core::Session;

    let session = MockSession::new();
    let mut conn = Conn::establish(session.clone()).await.unwrap();

    let reader = tokio::spawn(async move {
        let mut buf = [0u8; 8];
        conn.read(&mut buf).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.close().unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
    let err = result.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
}

#[tokio::test]
async fn closer_releases_pending_read() {
    let session = MockSession::new();
    let mut conn = Conn::establish(session.clone()).await.unwrap();
    let closer = conn.closer();

    let reader = tokio::spawn(async move {
        let mut buf = [0u8; 8];
        let result = conn.read(&mut buf).await.map(|_| ());
        (conn, result)
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    closer.close().unwrap();

    let (mut conn, result) =
        tokio::time::timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
    assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionAborted);
    assert!(closer.is_closed());

    // Closing again through the connection does not reach the session
    conn.close().await.unwrap();
    closer.clone().close().unwrap();
    assert_eq!(session.close_calls(), 1);
}

#[tokio::test]
async fn addresses_come_from_session() {
    let local = addr("10.0.0.1:5000");
    let remote = addr("10.0.0.2:4433");
    let conn = Conn::establish(MockSession::with_addrs(Some(local), Some(remote))).await.unwrap();

    assert_eq!(conn.local_addr(), Some(local));
    assert_eq!(conn.remote_addr(), Some(remote));
}

#[tokio::test]
async fn unset_addresses_stay_unset() {
    let conn = Conn::establish(MockSession::new()).await.unwrap();

    assert_eq!(conn.local_addr(), None);
    assert_eq!(conn.remote_addr(), None);
}

#[tokio::test]
async fn close_finishes_stream_and_closes_session() {
    let session = MockSession::new();
    let mut conn = Conn::establish(session.clone()).await.unwrap();

    conn.write_all(b"bye").await.unwrap();
    conn.close().await.unwrap();

    assert!(session.is_closed());
    let mut far = session.take_opened().pop().unwrap();
    let mut received = Vec::new();
    far.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"bye");
}

#[tokio::test]
async fn close_is_idempotent() {
    let session = MockSession::new();
    let mut conn = Conn::establish(session.clone()).await.unwrap();

    conn.close().await.unwrap();
    conn.close().await.unwrap();

    assert_eq!(session.close_calls(), 1);
}

#[tokio::test]
async fn close_error_is_propagated() {
    let session = MockSession::new();
    let mut conn = Conn::establish(session.clone()).await.unwrap();

    session.fail_close(io::ErrorKind::BrokenPipe, "transport gone");
    let err = conn.close().await.unwrap_err();

    assert!(matches!(err, Error::Close(_)));
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
}

#[tokio::test]
async fn open_failure_closes_session() {
    let session = MockSession::new();
    session.fail_open(io::ErrorKind::ConnectionRefused, "stream limit reached");

    let err = Conn::establish(session.clone()).await.unwrap_err();

    assert!(matches!(err, Error::OpenStream(_)));
    assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    assert!(session.is_closed());
}

#[tokio::test]
async fn deadlines_are_accepted_and_ignored() {
    let session = MockSession::new();
    let mut conn = Conn::establish(session.clone()).await.unwrap();
    let past = std::time::Instant::now();

    conn.set_deadline(Some(past)).unwrap();
    conn.set_read_deadline(Some(past)).unwrap();
    conn.set_write_deadline(None).unwrap();

    // An expired deadline does not fail I/O
    conn.write_all(b"still writable").await.unwrap();
    session.push_incoming(b"ok").await.unwrap();
    let mut buf = [0u8; 2];
    conn.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ok");
}

#[tokio::test]
async fn paired_conns_exchange_both_directions() {
    let (a, b) = MockSession::pair(addr("127.0.0.1:50000"), addr("127.0.0.1:4433"));
    let mut client = Conn::establish(a).await.unwrap();
    let mut server = Conn::establish(b).await.unwrap();

    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    server.write_all(b"pong").await.unwrap();
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");

    assert_eq!(client.remote_addr(), server.local_addr());
}

#[tokio::test]
async fn split_halves_work_concurrently() {
    let (a, b) = MockSession::pair(addr("127.0.0.1:50000"), addr("127.0.0.1:4433"));
    let client = Conn::establish(a).await.unwrap();
    let mut server = Conn::establish(b).await.unwrap();

    let (mut read_half, mut write_half) = tokio::io::split(client);
    let payload = quicconn_harness::random_payload(200 * 1024, 3);

    let writer = {
        let payload = payload.clone();
        tokio::spawn(async move {
            write_half.write_all(&payload).await.unwrap();
            write_half.shutdown().await.unwrap();
            write_half
        })
    };

    // Server echoes what it reads
    let echo = tokio::spawn(async move {
        let mut buf = vec![0u8; 8 * 1024];
        loop {
            let n = server.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            server.write_all(&buf[..n]).await.unwrap();
        }
        server.shutdown().await.unwrap();
        server
    });

    let mut echoed = Vec::new();
    read_half.read_to_end(&mut echoed).await.unwrap();
    assert_eq!(echoed, payload);

    let _write_half = writer.await.unwrap();
    let _server = echo.await.unwrap();
}
