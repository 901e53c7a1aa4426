//! Byte-stream property: whatever one side writes, the other reads back
//! exactly and in order, regardless of how writes and reads are chunked.

use std::net::SocketAddr;

use proptest::prelude::*;
use quicconn_core::Conn;
use quicconn_harness::{MockSession, random_payload};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn transfer(payload: &[u8], write_chunk: usize, read_chunk: usize) -> Vec<u8> {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();

    rt.block_on(async {
        let a: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:4433".parse().unwrap();
        let (client, server) = MockSession::pair(a, b);
        let mut client = Conn::establish(client).await.unwrap();
        let mut server = Conn::establish(server).await.unwrap();

        let send = async {
            for chunk in payload.chunks(write_chunk) {
                client.write_all(chunk).await.unwrap();
            }
            client.shutdown().await.unwrap();
        };

        let receive = async {
            let mut received = Vec::with_capacity(payload.len());
            let mut buf = vec![0u8; read_chunk];
            loop {
                let n = server.read(&mut buf).await.unwrap();
                if n == 0 {
                    break received;
                }
                received.extend_from_slice(&buf[..n]);
            }
        };

        let ((), received) = tokio::join!(send, receive);
        received
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn bytes_arrive_exactly_and_in_order(
        len in 0usize..256 * 1024,
        seed in any::<u64>(),
        write_chunk in 1usize..32 * 1024,
        read_chunk in 1usize..32 * 1024,
    ) {
        let payload = random_payload(len, seed);
        let received = transfer(&payload, write_chunk, read_chunk);
        prop_assert_eq!(received, payload);
    }
}

#[test]
fn empty_payload_reads_end_of_stream() {
    assert!(transfer(&[], 1, 1).is_empty());
}
