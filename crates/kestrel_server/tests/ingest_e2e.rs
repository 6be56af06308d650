//! End-to-end: wire bytes over a real socket, through the parser and the
//! ingest thread, observed via a search on the shared sequencer handle.

use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use kestrel_common::config::ServerConfig;
use kestrel_common::{PageId, Payload};
use kestrel_core::{CollectingCursor, SearchQuery};
use kestrel_server::{IngestPipeline, IngestServer};

async fn wait_for_points(
    sequencer: &std::sync::Arc<kestrel_core::Sequencer>,
    expected: usize,
) -> Vec<f64> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let mut cursor = CollectingCursor::new();
        sequencer.search(&SearchQuery::range(0, u64::MAX), &mut cursor);
        if cursor.items.len() >= expected {
            return cursor
                .payloads()
                .into_iter()
                .map(|p| match p {
                    Payload::Value(v) => v,
                    Payload::Offset(_) => panic!("expected inline payload"),
                })
                .collect();
        }
        assert!(
            Instant::now() < deadline,
            "ingested records never became searchable"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_wire_records_become_searchable() {
    let pipeline = IngestPipeline::start(PageId(0), 1_000_000, 256);
    let sequencer = pipeline.sequencer().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = IngestServer::new(ServerConfig::default(), pipeline.sender());
    let server_task = tokio::spawn(server.serve(listener));

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b":1\r\n:2\r\n+34.5\r\n:6\r\n:7\r\n+8.9\r\n")
        .await
        .unwrap();
    client.flush().await.unwrap();

    let seen = wait_for_points(&sequencer, 2).await;
    assert_eq!(seen, vec![34.5, 8.9]); // key order: ts 2 before ts 7

    drop(client);
    server_task.abort();
    let stats = tokio::task::spawn_blocking(move || pipeline.shutdown())
        .await
        .unwrap();
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.flushed, 2);
}

#[tokio::test]
async fn test_record_split_across_tcp_writes() {
    let pipeline = IngestPipeline::start(PageId(0), 1_000_000, 256);
    let sequencer = pipeline.sequencer().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = IngestServer::new(ServerConfig::default(), pipeline.sender());
    let server_task = tokio::spawn(server.serve(listener));

    let mut client = TcpStream::connect(addr).await.unwrap();
    // The record is fragmented mid-token; the parser must resume across
    // socket reads.
    client.write_all(b":10\r\n:2").await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.write_all(b"0\r\n+1.25\r\n").await.unwrap();
    client.flush().await.unwrap();

    let seen = wait_for_points(&sequencer, 1).await;
    assert_eq!(seen, vec![1.25]);

    drop(client);
    server_task.abort();
    let stats = tokio::task::spawn_blocking(move || pipeline.shutdown())
        .await
        .unwrap();
    assert_eq!(stats.accepted, 1);
}
