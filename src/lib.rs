//! Rust Duplex Transport
//!
//! Full-duplex, message-oriented sockets layered over a carrier that moves
//! discrete framed units.
//!
//! ## Features
//!
//! - `Socket` with independent, concurrency-safe `send`/`recv`/`close`
//! - Strictly increasing correlation ids; wire order equals id order
//! - Inbound duplex queue with a bounded primary region and unbounded
//!   overflow: the reader never blocks or drops, delivery stays FIFO
//! - `Listener` serving each connection on its own task
//! - Length-prefixed frames carrying a header map and an opaque body
//! - In-memory socket pairs for tests
//!
//! ## Example
//!
//! ```no_run
//! use rust_duplex_transport::{Message, Socket, Transport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Transport::new();
//!     let listener = Arc::new(transport.listen("127.0.0.1:8080").await?);
//!
//!     listener
//!         .accept(|socket: Arc<Socket>| async move {
//!             while let Ok(mut msg) = socket.recv().await {
//!                 if socket.send(&mut msg).await.is_err() {
//!                     break;
//!                 }
//!             }
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod error;
pub mod socket;

// Re-export main types
pub use self::core::{
    CorrelationSequencer, DuplexQueue, DuplexQueueStats, Header, Listener, Message, Transport,
    TransportConfig, WireReader, WireWriter, CORRELATION_ID_HEADER, MAX_MESSAGE_SIZE,
};
pub use error::{Result, TransportError};
pub use socket::{EchoHandler, Socket, SocketConfig, SocketHandler, SocketState};
