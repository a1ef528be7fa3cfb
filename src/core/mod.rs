//! Core components: message, sequencer, duplex queue, wire adapters, transport

pub mod duplex_queue;
pub mod listener;
pub mod message;
pub mod sequencer;
pub mod transport;
pub mod wire;

pub use duplex_queue::{DuplexQueue, DuplexQueueStats, DEFAULT_QUEUE_CAPACITY};
pub use listener::Listener;
pub use message::{Header, Message, CORRELATION_ID_HEADER, MAX_MESSAGE_SIZE};
pub use sequencer::CorrelationSequencer;
pub use transport::{Transport, TransportConfig};
pub use wire::{FrameReader, FrameWriter, WireReader, WireWriter};
