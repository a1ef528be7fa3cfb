//! Listener: accepts connections and hands each one to a handler

use crate::core::transport::{configure_stream, TransportConfig};
use crate::error::{Result, TransportError};
use crate::socket::{Socket, SocketHandler};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};

/// Bound listener producing one [`Socket`] per accepted connection
///
/// `accept` and `close` both take `&self`; keep the listener in an `Arc` to
/// run the accept loop on its own task and close it from another.
pub struct Listener {
    config: TransportConfig,
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    connection_count: Arc<AtomicU64>,
    /// Semaphore for atomic connection limiting
    connection_semaphore: Arc<Semaphore>,
    sockets: Arc<RwLock<Vec<Arc<Socket>>>>,
    handler_tasks: Arc<RwLock<Vec<JoinHandle<()>>>>,
}

impl Listener {
    pub(crate) async fn bind(addr: SocketAddr, config: TransportConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::connection(format!("Failed to bind {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = watch::channel(false);

        tracing::info!("Listening on {}", local_addr);

        Ok(Self {
            connection_semaphore: Arc::new(Semaphore::new(config.max_connections)),
            config,
            local_addr,
            listener: Mutex::new(Some(listener)),
            running: AtomicBool::new(false),
            shutdown_tx,
            connection_count: Arc::new(AtomicU64::new(0)),
            sockets: Arc::new(RwLock::new(Vec::new())),
            handler_tasks: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Bound address as `host:port`, suitable for `Transport::dial`
    #[must_use]
    pub fn addr(&self) -> String {
        self.local_addr.to_string()
    }

    /// Bound socket address
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Check if the accept loop is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Active connection count
    #[must_use]
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Sockets whose handlers are still running
    pub fn sockets(&self) -> Vec<Arc<Socket>> {
        self.sockets.read().clone()
    }

    /// Accept connections until [`close`](Self::close) is called
    ///
    /// Each connection is served by `handler` on its own task, so a slow
    /// handler never delays new connections. The socket is closed when the
    /// handler returns.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidState`] if the listener is closed or
    /// another accept loop is already running.
    pub async fn accept<H>(&self, handler: H) -> Result<()>
    where
        H: SocketHandler + 'static,
    {
        let handler = Arc::new(handler);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let mut listener_guard = self
            .listener
            .try_lock()
            .map_err(|_| TransportError::invalid_state("Listener is already accepting"))?;
        if *shutdown_rx.borrow() {
            return Err(TransportError::invalid_state("Listener is closed"));
        }
        let listener = listener_guard
            .as_mut()
            .ok_or_else(|| TransportError::invalid_state("Listener is closed"))?;

        self.running.store(true, Ordering::Release);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => self.dispatch(stream, peer_addr, &handler),
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("Listener on {} received shutdown signal", self.local_addr);
                    break;
                }
            }
        }

        self.running.store(false, Ordering::Release);
        Ok(())
    }

    /// Admit one connection and spawn its handler task
    fn dispatch<H>(&self, stream: TcpStream, peer_addr: SocketAddr, handler: &Arc<H>)
    where
        H: SocketHandler + 'static,
    {
        let permit = match Arc::clone(&self.connection_semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    "Connection limit reached ({}), rejecting {}",
                    self.config.max_connections,
                    peer_addr
                );
                drop(stream);
                return;
            }
        };

        let socket = match configure_stream(stream, self.config.socket.keep_alive)
            .and_then(|stream| Socket::from_tcp(stream, self.config.socket.clone()))
        {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                tracing::error!("Failed to set up connection from {}: {}", peer_addr, e);
                return;
            }
        };

        tracing::info!("Socket {} accepted from {}", socket.id(), peer_addr);
        self.connection_count.fetch_add(1, Ordering::Relaxed);
        self.sockets.write().push(Arc::clone(&socket));

        let task = Self::serve(
            socket,
            Arc::clone(handler),
            Arc::clone(&self.sockets),
            Arc::clone(&self.connection_count),
            permit,
        );

        let mut tasks = self.handler_tasks.write();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Run the handler for one socket, then close and deregister it
    ///
    /// The handler runs on its own task so a panic in it still reaches the
    /// cleanup below. The semaphore permit is held until the connection is
    /// done.
    fn serve<H>(
        socket: Arc<Socket>,
        handler: Arc<H>,
        sockets: Arc<RwLock<Vec<Arc<Socket>>>>,
        connection_count: Arc<AtomicU64>,
        _permit: OwnedSemaphorePermit,
    ) -> JoinHandle<()>
    where
        H: SocketHandler + 'static,
    {
        tokio::spawn(async move {
            let handler_task = tokio::spawn({
                let socket = Arc::clone(&socket);
                async move { handler.handle(socket).await }
            });
            let _abort = AbortOnDrop(handler_task.abort_handle());

            if let Err(e) = handler_task.await {
                if e.is_panic() {
                    tracing::error!("Socket {} handler panicked", socket.id());
                }
            }

            if let Err(e) = socket.close().await {
                tracing::debug!("Socket {} close error: {}", socket.id(), e);
            }
            sockets.write().retain(|s| !Arc::ptr_eq(s, &socket));
            connection_count.fetch_sub(1, Ordering::Release);

            tracing::debug!(
                "Socket {} handler finished (uptime: {:?})",
                socket.id(),
                socket.uptime()
            );
        })
    }

    /// Stop accepting and close every active socket
    ///
    /// Unblocks a running [`accept`](Self::accept) and releases the bound
    /// port. Handlers observe end-of-stream on their sockets and return.
    pub async fn close(&self) -> Result<()> {
        self.shutdown_tx.send_replace(true);

        // The accept loop holds the listener until it sees the signal
        if let Some(listener) = self.listener.lock().await.take() {
            drop(listener);
            tracing::info!("Listener on {} closed", self.local_addr);
        }

        let sockets = self.sockets.read().clone();
        for socket in sockets {
            let _ = socket.close().await;
        }

        self.running.store(false, Ordering::Release);
        Ok(())
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Aborts handler tasks when dropped
impl Drop for Listener {
    fn drop(&mut self) {
        let tasks = {
            let mut tasks = self.handler_tasks.write();
            std::mem::take(&mut *tasks)
        };

        let mut aborted = 0;
        for task in tasks {
            if !task.is_finished() {
                task.abort();
                aborted += 1;
            }
        }

        if aborted > 0 {
            tracing::warn!(
                "Listener on {} dropped with {} running handler(s) - aborting",
                self.local_addr,
                aborted
            );
        }
    }
}
