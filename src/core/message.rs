//! Message type and wire frame codec

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TransportError};

/// Maximum frame size (16MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Reserved header key carrying the correlation identifier
pub const CORRELATION_ID_HEADER: &str = "Correlation-Id";

/// Frame length prefix size (4 bytes)
const LENGTH_SIZE: usize = 4;

/// Header length field size (4 bytes)
const HEADER_LENGTH_SIZE: usize = 4;

/// Message header map
pub type Header = HashMap<String, String>;

/// Unit of data exchanged over a socket
///
/// The body is opaque to the queue and sequencer. The header is a string map
/// that gains the [`CORRELATION_ID_HEADER`] key when the message is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    header: Header,
    body: Bytes,
}

impl Message {
    /// Create a new message from a body
    #[must_use]
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            header: Header::new(),
            body: body.into(),
        }
    }

    /// Create a message from an explicit header and body
    #[must_use]
    pub fn with_header(header: Header, body: impl Into<Bytes>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    /// Create a message whose body is the JSON encoding of `value`
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_vec(value).map_err(|e| {
            TransportError::serialization(format!("JSON serialization failed: {}", e))
        })?;
        Ok(Self::new(json))
    }

    /// Deserialize the body as JSON
    pub fn to_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            TransportError::serialization(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Get the message body
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replace the message body
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Get the header map
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Get the header map for modification
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Look up a single header value
    #[must_use]
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.header.get(key).map(String::as_str)
    }

    /// Set a header value, replacing any previous one
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.header.insert(key.into(), value.into());
    }

    /// Builder-style header insertion
    #[must_use]
    pub fn header_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    /// Correlation identifier, if the message has been tagged
    #[must_use]
    pub fn correlation_id(&self) -> Option<u64> {
        self.get_header(CORRELATION_ID_HEADER)
            .and_then(|v| v.parse().ok())
    }

    pub(crate) fn set_correlation_id(&mut self, id: u64) {
        self.set_header(CORRELATION_ID_HEADER, id.to_string());
    }

    /// Body size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Check if the body is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Encode message into a wire frame
    ///
    /// Layout: `u32` frame length, `u32` header length, JSON header, body.
    /// The frame length counts every byte after itself.
    pub fn encode(&self) -> Result<BytesMut> {
        let header = serde_json::to_vec(&self.header).map_err(|e| {
            TransportError::serialization(format!("Header serialization failed: {}", e))
        })?;

        let len = HEADER_LENGTH_SIZE + header.len() + self.body.len();
        if len > MAX_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
        }

        let mut buf = BytesMut::with_capacity(LENGTH_SIZE + len);
        buf.put_u32(len as u32);
        buf.put_u32(header.len() as u32);
        buf.put_slice(&header);
        buf.put_slice(&self.body);
        Ok(buf)
    }

    /// Decode one frame from the front of `buf`
    ///
    /// Returns `Ok(None)` while the buffer holds less than a full frame.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>> {
        if buf.len() < LENGTH_SIZE {
            return Ok(None);
        }

        let mut length_bytes = [0u8; LENGTH_SIZE];
        length_bytes.copy_from_slice(&buf[..LENGTH_SIZE]);
        let len = u32::from_be_bytes(length_bytes) as usize;

        if len > MAX_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
        }
        if len < HEADER_LENGTH_SIZE {
            return Err(TransportError::serialization(format!(
                "Frame length {} shorter than header length field",
                len
            )));
        }

        if buf.len() < LENGTH_SIZE + len {
            return Ok(None);
        }

        buf.advance(LENGTH_SIZE);
        let mut frame = buf.split_to(len);

        let header_len = frame.get_u32() as usize;
        if header_len > frame.len() {
            return Err(TransportError::serialization(format!(
                "Header length {} exceeds frame payload {}",
                header_len,
                frame.len()
            )));
        }

        let header_bytes = frame.split_to(header_len);
        let header: Header = serde_json::from_slice(&header_bytes).map_err(|e| {
            TransportError::serialization(format!("Header deserialization failed: {}", e))
        })?;

        Ok(Some(Self {
            header,
            body: frame.freeze(),
        }))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.correlation_id() {
            Some(id) => write!(f, "Message[#{} {} bytes]", id, self.size()),
            None => write!(f, "Message[{} bytes]", self.size()),
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::new(Bytes::from(s))
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Self::new(Bytes::from(v))
    }
}
