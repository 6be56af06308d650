//! TCP ingest listener.
//!
//! Accepts connections and runs one task per connection: socket reads become
//! PDUs, the wire parser turns PDUs into records, and records are forwarded
//! to the ingest thread over its bounded channel. Any protocol error drops
//! the connection; the parser instance is unusable after the first error.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::Semaphore;

use kestrel_common::config::ServerConfig;
use kestrel_protocol::{Pdu, ProtocolConsumer, WireParser};

use crate::ingest::WriteRecord;

/// Consumer that buffers records completed within one PDU so the connection
/// task can forward them asynchronously after the (synchronous) parse step.
#[derive(Debug, Default)]
struct BufferingConsumer {
    records: Vec<WriteRecord>,
    bulk_count: u64,
}

impl ProtocolConsumer for BufferingConsumer {
    fn write_double(&mut self, param: u64, timestamp: u64, value: f64) {
        self.records.push(WriteRecord {
            param,
            timestamp,
            value,
        });
    }

    fn add_bulk_string(&mut self, bytes: &[u8]) {
        // Bulk strings are not part of the numeric ingest path.
        self.bulk_count += 1;
        tracing::debug!(len = bytes.len(), "bulk string ignored by the ingest path");
    }
}

/// The ingest TCP server.
pub struct IngestServer {
    config: ServerConfig,
    tx: mpsc::Sender<WriteRecord>,
}

impl IngestServer {
    pub fn new(config: ServerConfig, tx: mpsc::Sender<WriteRecord>) -> Self {
        Self { config, tx }
    }

    /// Bind the configured address and serve until the task is cancelled.
    pub async fn run(self) -> io::Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "ingest listener ready");
        self.serve(listener).await
    }

    /// Serve on an already-bound listener (lets tests bind port 0).
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        let limiter = if self.config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(self.config.max_connections)))
        } else {
            None
        };

        loop {
            let (stream, peer) = listener.accept().await?;
            let permit = match &limiter {
                Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        tracing::warn!(%peer, "connection limit reached; refusing");
                        continue;
                    }
                },
                None => None,
            };

            let tx = self.tx.clone();
            let read_buffer_bytes = self.config.read_buffer_bytes;
            tokio::spawn(async move {
                tracing::debug!(%peer, "ingest connection opened");
                handle_connection(stream, peer, tx, read_buffer_bytes).await;
                drop(permit);
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<WriteRecord>,
    read_buffer_bytes: usize,
) {
    let mut parser = WireParser::new(BufferingConsumer::default());
    let mut buf = BytesMut::with_capacity(read_buffer_bytes);

    loop {
        let n = match stream.read_buf(&mut buf).await {
            Ok(n) => n,
            Err(error) => {
                tracing::debug!(%peer, %error, "ingest connection read failed");
                return;
            }
        };
        if n == 0 {
            // Peer closed the stream; a half-parsed token means it died
            // mid-record.
            if let Err(error) = parser.close() {
                tracing::warn!(%peer, %error, "ingest connection closed mid-stream");
            } else {
                tracing::debug!(%peer, "ingest connection closed");
            }
            return;
        }

        // Everything read so far becomes one PDU; the parser may finish any
        // number of records with it, including zero.
        let pdu = Pdu::new(buf.split().freeze());
        if let Err(error) = parser.parse_next(pdu) {
            tracing::warn!(%peer, %error, "protocol error; dropping connection");
            return;
        }
        for record in std::mem::take(&mut parser.consumer_mut().records) {
            if tx.send(record).await.is_err() {
                tracing::warn!(%peer, "ingest pipeline stopped; dropping connection");
                return;
            }
        }
    }
}
