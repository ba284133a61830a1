//! Tagged messages and the shared, serialised writer both pipelines use.
//!
//! ## Wire format
//!
//! Every message is one binary frame on the underlying framed transport:
//! ```text
//! tag:      u8   (0x01 = video, 0x02 = audio)
//! payload:  [u8] (encoder packet or PCM chunk, to the end of the frame)
//! ```
//! There is no length field; the transport's own framing delimits
//! messages. Video and audio messages may interleave arbitrarily.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Buf, BufMut};

use crate::error::{BeamError, Result};

// ── StreamTag ────────────────────────────────────────────────────

/// Stream discriminator carried in the first byte of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamTag {
    Video = 0x01,
    Audio = 0x02,
}

impl TryFrom<u8> for StreamTag {
    type Error = BeamError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(StreamTag::Video),
            0x02 => Ok(StreamTag::Audio),
            other => Err(BeamError::UnknownTag(other)),
        }
    }
}

// ── TransportMessage ─────────────────────────────────────────────

/// One tagged unit of transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    bytes: Vec<u8>,
}

impl TransportMessage {
    /// Tag `payload` with `tag`. The tag byte is written first.
    pub fn new(tag: StreamTag, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(1 + payload.len());
        bytes.put_u8(tag as u8);
        bytes.put_slice(payload);
        Self { bytes }
    }

    pub fn video(packet: &[u8]) -> Self {
        Self::new(StreamTag::Video, packet)
    }

    pub fn audio(chunk: &[u8]) -> Self {
        Self::new(StreamTag::Audio, chunk)
    }

    /// Parse a received frame.
    pub fn decode(mut frame: &[u8]) -> Result<(StreamTag, &[u8])> {
        if !frame.has_remaining() {
            return Err(BeamError::InvalidMessage("empty frame"));
        }
        let tag = StreamTag::try_from(frame.get_u8())?;
        Ok((tag, frame))
    }

    pub fn tag(&self) -> StreamTag {
        // constructors always write a valid tag
        match self.bytes[0] {
            0x01 => StreamTag::Video,
            _ => StreamTag::Audio,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[1..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// ── MessageSink ──────────────────────────────────────────────────

/// The framed connection primitive: one call sends one binary message.
///
/// Implementations must deliver each call as a single frame; the
/// [`TransportWriter`] guarantees calls never overlap.
pub trait MessageSink: Send {
    fn send_binary(&mut self, frame: Vec<u8>) -> Result<()>;

    /// Orderly close at session teardown.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ── TransportWriter ──────────────────────────────────────────────

/// Cloneable handle serialising all writes onto one [`MessageSink`].
///
/// The lock is held for exactly one message write, tag and payload
/// together, and released before returning. Nothing is buffered,
/// coalesced or retried.
#[derive(Clone)]
pub struct TransportWriter {
    inner: Arc<WriterInner>,
}

struct WriterInner {
    sink: Mutex<Box<dyn MessageSink>>,
    messages: AtomicU64,
    bytes: AtomicU64,
}

impl TransportWriter {
    pub fn new(sink: impl MessageSink + 'static) -> Self {
        Self::from_boxed(Box::new(sink))
    }

    pub fn from_boxed(sink: Box<dyn MessageSink>) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                sink: Mutex::new(sink),
                messages: AtomicU64::new(0),
                bytes: AtomicU64::new(0),
            }),
        }
    }

    /// Write one message. Errors from the sink are returned unchanged.
    pub fn write(&self, message: TransportMessage) -> Result<()> {
        let len = message.len() as u64;
        {
            let mut sink = self
                .inner
                .sink
                .lock()
                .map_err(|_| BeamError::Transport("writer lock poisoned".into()))?;
            sink.send_binary(message.into_bytes())?;
        }
        self.inner.messages.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    /// Close the underlying sink.
    pub fn close(&self) -> Result<()> {
        let mut sink = self
            .inner
            .sink
            .lock()
            .map_err(|_| BeamError::Transport("writer lock poisoned".into()))?;
        sink.close()
    }

    /// Messages written successfully so far.
    pub fn messages_written(&self) -> u64 {
        self.inner.messages.load(Ordering::Relaxed)
    }

    /// Bytes written successfully so far, tags included.
    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TransportWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportWriter")
            .field("messages", &self.messages_written())
            .field("bytes", &self.bytes_written())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
