//! Wire adapters: moving encoded messages over a byte stream
//!
//! A socket talks to its connection through a [`WireReader`] (used only by
//! the socket's reader task) and a [`WireWriter`] (used only inside the send
//! critical section). The framed implementations work over any tokio byte
//! stream, so TCP connections and in-memory pipes share one code path.

use crate::core::message::{Message, MAX_MESSAGE_SIZE};
use crate::error::{Result, TransportError};
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Receiving half of a wire adapter
#[async_trait]
pub trait WireReader: Send {
    /// Read the next message from the connection
    ///
    /// Returns [`TransportError::EndOfStream`] when the peer closed the
    /// connection cleanly between messages.
    async fn receive(&mut self) -> Result<Message>;
}

/// Transmitting half of a wire adapter
#[async_trait]
pub trait WireWriter: Send {
    /// Write one message to the connection
    async fn transmit(&mut self, message: &Message) -> Result<()>;

    /// Flush and close the write direction
    async fn shutdown(&mut self) -> Result<()>;
}

/// Reads length-prefixed frames from a byte stream
///
/// The read buffer persists across calls so several frames arriving in one
/// read are all delivered.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    read_timeout: Duration,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Wrap a read half
    ///
    /// `read_timeout` bounds each read once part of a frame has arrived; an
    /// idle connection with nothing buffered may wait indefinitely.
    pub fn new(inner: R, read_timeout: Duration) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
            read_timeout,
        }
    }
}

#[async_trait]
impl<R> WireReader for FrameReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Message> {
        // Maximum buffer size to prevent infinite loop on malformed data
        const MAX_BUFFER_SIZE: usize = MAX_MESSAGE_SIZE + 1024;

        loop {
            if let Some(message) = Message::decode(&mut self.buf)? {
                return Ok(message);
            }

            if self.buf.len() >= MAX_BUFFER_SIZE {
                return Err(TransportError::connection(
                    "Malformed frame: buffer exceeded maximum size without complete frame",
                ));
            }

            let n = if self.buf.is_empty() {
                self.inner
                    .read_buf(&mut self.buf)
                    .await
                    .map_err(|e| TransportError::connection(format!("Failed to read: {}", e)))?
            } else {
                // Mid-frame: a stalled peer must not hold the reader forever
                timeout(self.read_timeout, self.inner.read_buf(&mut self.buf))
                    .await
                    .map_err(|_| TransportError::timeout("Frame assembly timed out"))?
                    .map_err(|e| TransportError::connection(format!("Failed to read: {}", e)))?
            };

            if n == 0 {
                return if self.buf.is_empty() {
                    Err(TransportError::EndOfStream)
                } else {
                    Err(TransportError::connection(format!(
                        "Connection closed with {} bytes of a partial frame",
                        self.buf.len()
                    )))
                };
            }
        }
    }
}

/// Writes length-prefixed frames to a byte stream
pub struct FrameWriter<W> {
    inner: W,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a write half
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W> WireWriter for FrameWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn transmit(&mut self, message: &Message) -> Result<()> {
        let data = message.encode()?;

        self.inner
            .write_all(&data)
            .await
            .map_err(|e| TransportError::transmit(format!("Failed to write: {}", e)))?;
        self.inner
            .flush()
            .await
            .map_err(|e| TransportError::transmit(format!("Failed to flush: {}", e)))?;

        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_pipe() {
        let (a, b) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b, Duration::from_secs(1));

        // Larger than the pipe buffer, forcing several reads per frame
        let big = Message::new(vec![7u8; 1000]).header_entry("k", "v");
        let write = tokio::spawn(async move {
            writer.transmit(&big).await.unwrap();
            writer.transmit(&Message::new("tail")).await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let first = reader.receive().await.unwrap();
        assert_eq!(first.size(), 1000);
        assert_eq!(first.get_header("k"), Some("v"));
        let second = reader.receive().await.unwrap();
        assert_eq!(second.body().as_ref(), b"tail");
        assert!(matches!(
            reader.receive().await,
            Err(TransportError::EndOfStream)
        ));

        write.await.unwrap();
    }

    #[tokio::test]
    async fn test_truncated_frame_is_connection_error() {
        let (mut a, b) = tokio::io::duplex(256);
        let mut reader = FrameReader::new(b, Duration::from_secs(1));

        let encoded = Message::new("cut short").encode().unwrap();
        a.write_all(&encoded[..encoded.len() - 3]).await.unwrap();
        drop(a);

        assert!(matches!(
            reader.receive().await,
            Err(TransportError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_stalled_partial_frame_times_out() {
        let (mut a, b) = tokio::io::duplex(256);
        let mut reader = FrameReader::new(b, Duration::from_millis(50));

        let encoded = Message::new("stalled").encode().unwrap();
        a.write_all(&encoded[..6]).await.unwrap();

        assert!(matches!(
            reader.receive().await,
            Err(TransportError::Timeout(_))
        ));
        drop(a);
    }

    #[tokio::test]
    async fn test_transmit_to_closed_pipe_fails() {
        let (a, b) = tokio::io::duplex(64);
        drop(b);
        let mut writer = FrameWriter::new(a);
        assert!(matches!(
            writer.transmit(&Message::new("lost")).await,
            Err(TransportError::TransmitFailure(_))
        ));
    }
}
