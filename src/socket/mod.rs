//! Duplex socket endpoints

use crate::core::duplex_queue::{DuplexQueue, DuplexQueueStats, DEFAULT_QUEUE_CAPACITY};
use crate::core::message::Message;
use crate::core::sequencer::CorrelationSequencer;
use crate::core::wire::{FrameReader, FrameWriter, WireReader, WireWriter};
use crate::error::{Result, TransportError};
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::Rng;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Size of each direction of an in-memory socket pair
const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// Generate a cryptographically secure socket ID
fn generate_socket_id() -> u128 {
    OsRng.gen()
}

/// Per-socket configuration
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Capacity of the duplex queue's primary region
    pub queue_capacity: usize,
    /// Upper bound on a single transmission
    pub write_timeout: Duration,
    /// Upper bound on each read once part of a frame has arrived
    pub read_timeout: Duration,
    /// TCP keep-alive interval
    pub keep_alive: Option<Duration>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            keep_alive: Some(Duration::from_secs(60)),
        }
    }
}

impl SocketConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the primary queue capacity
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set write timeout
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set frame assembly read timeout
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set keep-alive interval
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }
}

/// Socket state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Open,
    Closing,
    Closed,
}

/// Full-duplex message endpoint
///
/// # Concurrency Design
///
/// - A dedicated reader task pulls frames off the connection and feeds the
///   duplex queue; `recv` only ever touches the queue.
/// - `send` holds the writer lock while it assigns the correlation id and
///   transmits, so wire order always matches id order.
/// - All methods take `&self`; share the socket between tasks with `Arc`.
pub struct Socket {
    id: u128,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    config: SocketConfig,
    state: Arc<RwLock<SocketState>>,
    sequencer: CorrelationSequencer,
    queue: Arc<DuplexQueue>,
    writer: Mutex<Option<Box<dyn WireWriter>>>,
    /// Set once a transmission fails partway; only touched under `writer`
    writer_broken: AtomicBool,
    closed: Notify,
    reader_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: parking_lot::Mutex<Option<mpsc::Sender<()>>>,
    created_at: Instant,
}

impl Socket {
    /// Build a socket from a wire adapter pair and start its reader task
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_wire(
        reader: Box<dyn WireReader>,
        writer: Box<dyn WireWriter>,
        local_addr: Option<SocketAddr>,
        peer_addr: Option<SocketAddr>,
        config: SocketConfig,
    ) -> Self {
        let id = generate_socket_id();
        let queue = Arc::new(DuplexQueue::new(config.queue_capacity));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let reader_task = tokio::spawn(Self::read_loop(
            id,
            reader,
            Arc::clone(&queue),
            shutdown_rx,
        ));

        Self {
            id,
            local_addr,
            peer_addr,
            config,
            state: Arc::new(RwLock::new(SocketState::Open)),
            sequencer: CorrelationSequencer::new(),
            queue,
            writer: Mutex::new(Some(writer)),
            writer_broken: AtomicBool::new(false),
            closed: Notify::new(),
            reader_task: parking_lot::Mutex::new(Some(reader_task)),
            shutdown_tx: parking_lot::Mutex::new(Some(shutdown_tx)),
            created_at: Instant::now(),
        }
    }

    /// Build a socket over an established TCP connection
    pub fn from_tcp(stream: TcpStream, config: SocketConfig) -> Result<Self> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self::from_wire(
            Box::new(FrameReader::new(read_half, config.read_timeout)),
            Box::new(FrameWriter::new(write_half)),
            Some(local_addr),
            Some(peer_addr),
            config,
        ))
    }

    /// Two sockets connected back to back through an in-memory pipe
    pub fn pair(config: SocketConfig) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(PIPE_BUFFER_SIZE);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);

        let left = Self::from_wire(
            Box::new(FrameReader::new(a_read, config.read_timeout)),
            Box::new(FrameWriter::new(a_write)),
            None,
            None,
            config.clone(),
        );
        let right = Self::from_wire(
            Box::new(FrameReader::new(b_read, config.read_timeout)),
            Box::new(FrameWriter::new(b_write)),
            None,
            None,
            config,
        );
        (left, right)
    }

    /// Reader task: the queue's only producer
    async fn read_loop(
        id: u128,
        mut reader: Box<dyn WireReader>,
        queue: Arc<DuplexQueue>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                result = reader.receive() => {
                    match result {
                        Ok(message) => {
                            if queue.put(message).is_err() {
                                break;
                            }
                        }
                        Err(TransportError::EndOfStream) => {
                            tracing::debug!("Socket {} peer closed the connection", id);
                            break;
                        }
                        Err(e) => {
                            tracing::warn!("Socket {} read failed: {}", id, e);
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        queue.close();
    }

    /// Get socket ID (128-bit random)
    #[must_use]
    pub fn id(&self) -> u128 {
        self.id
    }

    /// Local address, if backed by a network connection
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Peer address, if backed by a network connection
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Get the socket configuration
    #[must_use]
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Get socket state
    #[must_use]
    pub fn state(&self) -> SocketState {
        *self.state.read()
    }

    /// Check if the socket is open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SocketState::Open
    }

    /// Get socket uptime
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Received messages waiting for `recv`
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Inbound queue statistics
    #[must_use]
    pub fn queue_stats(&self) -> DuplexQueueStats {
        self.queue.stats()
    }

    /// Last correlation id assigned by `send` (0 if nothing sent yet)
    #[must_use]
    pub fn last_correlation_id(&self) -> u64 {
        self.sequencer.current()
    }

    /// Tag and transmit a message
    ///
    /// The correlation id is written into the message header and returned.
    /// Concurrent senders are serialized; the message that gets the smaller
    /// id is always the one written to the wire first.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ClosedSocket`] if the socket is closing or closed
    /// - [`TransportError::TransmitFailure`] if the write fails or times out
    ///
    /// A failed send leaves the socket open, but a failed or timed out write
    /// may have left part of a frame on the connection. From then on every
    /// `send` fails with `TransmitFailure` without touching the wire.
    pub async fn send(&self, message: &mut Message) -> Result<u64> {
        if !self.is_open() {
            return Err(TransportError::ClosedSocket);
        }

        let mut writer_guard = self.writer.lock().await;
        // close() takes the writer once it wins the lock
        let writer = writer_guard.as_mut().ok_or(TransportError::ClosedSocket)?;
        if self.writer_broken.load(Ordering::Acquire) {
            return Err(TransportError::transmit(
                "Connection desynchronized by an earlier failed write",
            ));
        }

        let correlation_id = self.sequencer.next();
        message.set_correlation_id(correlation_id);

        let result = match timeout(self.config.write_timeout, writer.transmit(message)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::transmit("Write timed out")),
        };

        match result {
            Ok(()) => Ok(correlation_id),
            // Rejected before any byte was written; the stream is intact
            Err(e @ (TransportError::MessageTooLarge(..) | TransportError::Serialization(_))) => {
                Err(e)
            }
            Err(e) => {
                self.writer_broken.store(true, Ordering::Release);
                tracing::warn!("Socket {} write failed, writer disabled: {}", self.id, e);
                Err(e)
            }
        }
    }

    /// Wait for the next received message
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EndOfStream`] once the socket is closed, or
    /// the peer has gone away and every buffered message has been delivered.
    pub async fn recv(&self) -> Result<Message> {
        if self.state() == SocketState::Closed {
            return Err(TransportError::EndOfStream);
        }

        self.queue.take().await.map_err(|e| match e {
            TransportError::QueueClosed => TransportError::EndOfStream,
            other => other,
        })
    }

    /// Close the socket
    ///
    /// Idempotent. Wakes blocked `recv` callers with end-of-stream, discards
    /// undelivered messages, stops the reader task and releases the
    /// connection. An in-flight `send` finishes first. A call that arrives
    /// while another close is in progress returns once the socket is
    /// `Closed`.
    pub async fn close(&self) -> Result<()> {
        let in_progress = {
            let mut state = self.state.write();
            match *state {
                SocketState::Open => {
                    *state = SocketState::Closing;
                    false
                }
                SocketState::Closing => true,
                SocketState::Closed => return Ok(()),
            }
        };
        if in_progress {
            self.wait_closed().await;
            return Ok(());
        }

        self.queue.close();
        let discarded = self.queue.clear();
        if discarded > 0 {
            tracing::debug!(
                "Socket {} discarded {} undelivered message(s)",
                self.id,
                discarded
            );
        }

        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.try_send(());
        }
        let reader_task = self.reader_task.lock().take();
        if let Some(task) = reader_task {
            let _ = task.await;
        }

        // Waits for any in-flight send before releasing the connection
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = writer.shutdown().await;
        }

        *self.state.write() = SocketState::Closed;
        self.closed.notify_waiters();
        tracing::debug!(
            "Socket {} closed (uptime: {:?})",
            self.id,
            self.uptime()
        );

        Ok(())
    }

    async fn wait_closed(&self) {
        loop {
            let notified = self.closed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state() == SocketState::Closed {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Stops the reader task of a socket dropped without `close()`
impl Drop for Socket {
    fn drop(&mut self) {
        if *self.state.read() == SocketState::Open {
            tracing::warn!("Socket {} dropped while open - closing connection", self.id);

            if let Some(task) = self.reader_task.lock().take() {
                task.abort();
            }
            self.queue.close();
            *self.state.write() = SocketState::Closed;
        }
    }
}

/// Handler invoked once per accepted connection
#[async_trait]
pub trait SocketHandler: Send + Sync {
    /// Serve one connection; the socket is closed when this returns
    async fn handle(&self, socket: Arc<Socket>);
}

#[async_trait]
impl<F, Fut> SocketHandler for F
where
    F: Fn(Arc<Socket>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, socket: Arc<Socket>) {
        (self)(socket).await
    }
}

/// Handler that sends every received message straight back
pub struct EchoHandler;

#[async_trait]
impl SocketHandler for EchoHandler {
    async fn handle(&self, socket: Arc<Socket>) {
        let mut echoed = 0u64;
        loop {
            let mut message = match socket.recv().await {
                Ok(message) => message,
                Err(_) => break,
            };
            if let Err(e) = socket.send(&mut message).await {
                tracing::debug!("Socket {} echo failed: {}", socket.id(), e);
                break;
            }
            echoed += 1;
        }
        tracing::debug!("Socket {} echoed {} message(s)", socket.id(), echoed);
    }
}
