//! Per-client request loop.
//!
//! ```text
//!   accept ──> ConnectionHandler::run
//!                  │
//!                  ▼
//!          ┌───────────────────────┐
//!          │ frames in buffer? ────┼──yes──> execute ──> write reply ─┐
//!          │        │ no           │                                  │
//!          │        ▼              │<─────────────────────────────────┘
//!          │ read from socket      │
//!          └────────┬──────────────┘
//!                   │ EOF / error
//!                   ▼
//!               task ends
//! ```
//!
//! Incoming bytes accumulate in a `BytesMut`. A single read may hold half a
//! request or several of them, and the parser takes frames off the front
//! of the buffer as they complete. If the buffer reaches `max_frame_size`
//! without yielding a frame the client gets an error and is dropped.
//!
//! A well-framed but invalid request (wrong arity, non-UTF-8 argument, bad
//! `PX` value) is answered with an error and the loop carries on. A framing
//! error leaves the stream out of sync, so the client gets an error reply
//! and the connection is closed.

use crate::commands::CommandHandler;
use crate::protocol::{Command, ParseError, RespParser, RespValue};
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Default limit on a single buffered request (64 KB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

/// Counters shared by every connection task.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    accepted: AtomicU64,
    active: AtomicU64,
    requests: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

/// A point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub active: u64,
    pub requests: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn opened(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    fn closed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    fn request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn received(&self, n: usize) {
        self.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn sent(&self, n: usize) {
        self.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

/// Serves one client over any `AsyncRead + AsyncWrite` stream.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,
    peer: SocketAddr,
    /// Received bytes not yet consumed by the parser
    pending: BytesMut,
    commands: CommandHandler,
    parser: RespParser,
    stats: Arc<ConnectionStats>,
    max_frame_size: usize,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream` and counts the connection as open in `stats`.
    ///
    /// `max_frame_size` bounds how many bytes of an unfinished request are
    /// buffered before the client is dropped.
    pub fn new(
        stream: S,
        peer: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
        max_frame_size: usize,
    ) -> Self {
        stats.opened();

        Self {
            stream: BufWriter::new(stream),
            peer,
            pending: BytesMut::with_capacity(READ_CHUNK),
            commands,
            parser: RespParser::new(),
            stats,
            max_frame_size,
        }
    }

    /// Serves requests until the client goes away or the connection fails.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.peer, "Client connected");

        let outcome = self.serve().await;

        match &outcome {
            Err(ConnectionError::Disconnected) | Ok(()) => {
                info!(client = %self.peer, "Client disconnected")
            }
            Err(e) if e.is_reset() => debug!(client = %self.peer, "Connection reset by client"),
            Err(e) => warn!(client = %self.peer, error = %e, "Connection closed with error"),
        }

        self.stats.closed();
        outcome
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(frame) = self.next_frame().await? {
                let reply = match Command::from_frame(frame) {
                    Ok(command) => {
                        debug!(client = %self.peer, command = %command.kind(), "Executing command");
                        self.commands.execute(command)
                    }
                    Err(e) => {
                        debug!(client = %self.peer, error = %e, "Rejected request");
                        RespValue::from(&e)
                    }
                };

                self.stats.request();
                self.write_reply(&reply).await?;
            }

            self.fill_buffer().await?;
        }
    }

    /// Takes the next complete frame off the buffer.
    ///
    /// A framing error is reported to the client before it is returned.
    async fn next_frame(&mut self) -> Result<Option<Vec<Bytes>>, ConnectionError> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.pending) {
            Ok(Some((frame, consumed))) => {
                self.pending.advance(consumed);
                trace!(client = %self.peer, consumed, left = self.pending.len(), "Frame complete");
                Ok(Some(frame))
            }
            Ok(None) => {
                trace!(client = %self.peer, buffered = self.pending.len(), "Waiting for more data");
                Ok(None)
            }
            Err(e) => {
                warn!(client = %self.peer, error = %e, "Protocol error");
                self.write_reply(&RespValue::from(&e)).await?;
                Err(e.into())
            }
        }
    }

    /// Appends the next chunk read from the socket to the buffer.
    async fn fill_buffer(&mut self) -> Result<(), ConnectionError> {
        let buffered = self.pending.len();
        if buffered >= self.max_frame_size {
            error!(client = %self.peer, buffered, "Request exceeds frame size limit");
            let e = ParseError::FrameTooLarge {
                size: buffered,
                max: self.max_frame_size,
            };
            self.write_reply(&RespValue::from(&e)).await?;
            return Err(ConnectionError::FrameTooLarge(buffered));
        }

        self.pending.reserve(READ_CHUNK);
        let n = self.stream.get_mut().read_buf(&mut self.pending).await?;

        if n == 0 {
            return Err(if self.pending.is_empty() {
                ConnectionError::Disconnected
            } else {
                ConnectionError::UnexpectedEof
            });
        }

        self.stats.received(n);
        trace!(client = %self.peer, bytes = n, "Read");
        Ok(())
    }

    async fn write_reply(&mut self, reply: &RespValue) -> Result<(), ConnectionError> {
        let wire = reply.serialize();
        self.stream.write_all(&wire).await?;
        self.stream.flush().await?;
        self.stats.sent(wire.len());
        Ok(())
    }
}

/// Why a connection ended.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The byte stream is not valid RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// EOF between requests
    #[error("client disconnected")]
    Disconnected,

    /// EOF in the middle of a request
    #[error("connection closed mid-request")]
    UnexpectedEof,

    #[error("request of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
}

impl ConnectionError {
    fn is_reset(&self) -> bool {
        matches!(self, ConnectionError::Io(e) if e.kind() == io::ErrorKind::ConnectionReset)
    }
}

/// Serves an accepted TCP client to completion.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
    max_frame_size: usize,
) {
    let handler = ConnectionHandler::new(stream, peer, commands, stats, max_frame_size);
    // `run` already logged the outcome
    let _ = handler.run().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct TestServer {
        addr: SocketAddr,
        storage: Arc<StorageEngine>,
        stats: Arc<ConnectionStats>,
    }

    async fn spawn_server() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());

        let (server_storage, server_stats) = (Arc::clone(&storage), Arc::clone(&stats));
        tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    peer,
                    CommandHandler::new(Arc::clone(&server_storage)),
                    Arc::clone(&server_stats),
                    DEFAULT_MAX_FRAME_SIZE,
                ));
            }
        });

        TestServer {
            addr,
            storage,
            stats,
        }
    }

    /// Reads exactly `len` bytes or fails after two seconds.
    async fn read_reply(client: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        buf
    }

    async fn roundtrip(client: &mut TcpStream, request: &[u8], reply: &[u8]) {
        client.write_all(request).await.unwrap();
        assert_eq!(
            read_reply(client, reply.len()).await,
            reply,
            "request {:?}",
            String::from_utf8_lossy(request)
        );
    }

    fn mock_handler(
        stream: tokio_test::io::Mock,
        max_frame_size: usize,
    ) -> ConnectionHandler<tokio_test::io::Mock> {
        ConnectionHandler::new(
            stream,
            "127.0.0.1:40000".parse().unwrap(),
            CommandHandler::new(Arc::new(StorageEngine::new())),
            Arc::new(ConnectionStats::new()),
            max_frame_size,
        )
    }

    #[tokio::test]
    async fn test_ping() {
        let server = spawn_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let server = spawn_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$5\r\ncolor\r\n$4\r\nteal\r\n",
            b"+OK\r\n",
        )
        .await;
        roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$5\r\ncolor\r\n", b"+teal\r\n").await;
        roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$4\r\nnope\r\n", b"$-1\r\n").await;

        assert_eq!(server.storage.get("color"), Some("teal".to_string()));
    }

    #[tokio::test]
    async fn test_pipelined_requests_answered_in_order() {
        let server = spawn_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        let mut batch = Vec::new();
        batch.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n");
        batch.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\nb\r\n$1\r\n2\r\n");
        batch.extend_from_slice(b"*2\r\n$3\r\nGET\r\n$1\r\nb\r\n");
        batch.extend_from_slice(b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n");

        roundtrip(&mut client, &batch, b"+OK\r\n+OK\r\n+2\r\n+1\r\n").await;
    }

    #[tokio::test]
    async fn test_request_split_across_writes() {
        let server = spawn_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();
        client.set_nodelay(true).unwrap();

        client.write_all(b"*2\r\n$4\r\nECHO\r\n$5\r\nhel").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        roundtrip(&mut client, b"lo\r\n", b"+hello\r\n").await;
    }

    #[tokio::test]
    async fn test_request_errors_keep_connection_open() {
        let server = spawn_server().await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(
            &mut client,
            b"*1\r\n$3\r\nFOO\r\n",
            b"-ERR unknown command\r\n",
        )
        .await;
        roundtrip(
            &mut client,
            b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nPX\r\n$3\r\nabc\r\n",
            b"-ERR value is not an integer or out of range\r\n",
        )
        .await;
        roundtrip(
            &mut client,
            b"*1\r\n$3\r\nGET\r\n",
            b"-ERR wrong number of arguments for 'get' command\r\n",
        )
        .await;
        roundtrip(&mut client, b"*0\r\n", b"-ERR empty command\r\n").await;
        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_framing_error_closes_only_that_connection() {
        let server = spawn_server().await;
        let mut bad = TcpStream::connect(server.addr).await.unwrap();
        let mut good = TcpStream::connect(server.addr).await.unwrap();

        roundtrip(
            &mut bad,
            b"PING\r\n",
            b"-ERR Protocol error: expected '*', got 'P'\r\n",
        )
        .await;

        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), bad.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_empty());

        roundtrip(&mut good, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn test_stats_track_connection_lifecycle() {
        let server = spawn_server().await;
        assert_eq!(server.stats.snapshot(), StatsSnapshot::default());

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snap = server.stats.snapshot();
        assert_eq!(snap.accepted, 1);
        assert_eq!(snap.active, 1);
        assert_eq!(snap.requests, 1);
        assert_eq!(snap.bytes_in, 14);
        assert_eq!(snap.bytes_out, 7);

        drop(client);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(server.stats.snapshot().active, 0);
    }

    #[tokio::test]
    async fn test_mock_session() {
        let stream = tokio_test::io::Builder::new()
            .read(b"*3\r\n$4\r\nECHO\r\n$5\r\nhello\r\n$5\r\nworld\r\n")
            .write(b"+hello world\r\n")
            .read(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
            .write(b"+OK\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .write(b"+bar\r\n")
            .build();

        let result = mock_handler(stream, DEFAULT_MAX_FRAME_SIZE).run().await;
        assert!(matches!(result, Err(ConnectionError::Disconnected)));
    }

    #[tokio::test]
    async fn test_mock_line_break_value_gets_one_reply() {
        let stream = tokio_test::io::Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$6\r\na\r\n+OK\r\n")
            .write(b"-ERR SET value must not contain CR or LF\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .write(b"$-1\r\n")
            .read(b"*2\r\n$4\r\nECHO\r\n$6\r\nx\r\n$-1\r\n")
            .write(b"-ERR ECHO message must not contain CR or LF\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let result = mock_handler(stream, DEFAULT_MAX_FRAME_SIZE).run().await;
        assert!(matches!(result, Err(ConnectionError::Disconnected)));
    }

    #[tokio::test]
    async fn test_mock_eof_mid_request() {
        let stream = tokio_test::io::Builder::new()
            .read(b"*2\r\n$3\r\nGET\r\n")
            .build();

        let result = mock_handler(stream, DEFAULT_MAX_FRAME_SIZE).run().await;
        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_mock_frame_too_large() {
        let stream = tokio_test::io::Builder::new()
            .read(b"*1\r\n$100\r\naaaaaaaaaaaaaaaaaaaa")
            .write(b"-ERR Protocol error: frame too large: 30 (max: 16)\r\n")
            .build();

        let result = mock_handler(stream, 16).run().await;
        assert!(matches!(result, Err(ConnectionError::FrameTooLarge(30))));
    }
}
