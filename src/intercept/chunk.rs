//! Incremental body accumulation.
//!
//! # Responsibilities
//! - Collect body bytes that arrive as discrete chunks across many calls
//! - Detect the terminal chunk of a body stream
//! - Enforce the configured body size limit
//!
//! # Design Decisions
//! - A batch is terminal if *any* chunk in it is marked last
//! - Zero incoming bytes never touch the buffer (no reallocation)
//! - Allocation uses `try_reserve` so exhaustion surfaces as an error
//!   instead of aborting the process

use bytes::Bytes;
use thiserror::Error;

/// One discrete unit of body data delivered by the host runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyChunk {
    pub data: Bytes,
    /// Set on the last chunk of a body stream.
    pub last: bool,
}

impl BodyChunk {
    /// A non-terminal chunk carrying `data`.
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: false,
        }
    }

    /// A terminal chunk carrying `data`.
    pub fn terminal(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: true,
        }
    }

    /// An empty terminal chunk, used when the stream ends without trailing data.
    pub fn end() -> Self {
        Self::terminal(Bytes::new())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// True if any chunk in the batch ends the body.
pub fn is_terminal(chunks: &[BodyChunk]) -> bool {
    chunks.iter().any(|c| c.last)
}

/// Errors raised while growing a body buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccumulateError {
    #[error("body exceeds limit of {limit} bytes")]
    LimitExceeded { limit: usize },

    #[error("failed to allocate {requested} bytes for body buffer")]
    Allocation { requested: usize },
}

/// Outcome of a single [`ChunkAccumulator::append`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Bytes added by this call.
    pub added: usize,
    /// Whether the batch contained the terminal chunk.
    pub terminal: bool,
}

/// Growable byte buffer that assembles a body from its chunks in order.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    buf: Vec<u8>,
    limit: Option<usize>,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator that refuses to grow past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit: Some(limit),
        }
    }

    /// Append every chunk of the batch, preserving previously collected bytes.
    ///
    /// On error the buffer is left exactly as it was before the call.
    pub fn append(&mut self, chunks: &[BodyChunk]) -> Result<Appended, AccumulateError> {
        let terminal = is_terminal(chunks);
        let incoming: usize = chunks.iter().map(BodyChunk::len).sum();

        if incoming == 0 {
            return Ok(Appended { added: 0, terminal });
        }

        let total = self.buf.len().saturating_add(incoming);
        if let Some(limit) = self.limit {
            if total > limit {
                return Err(AccumulateError::LimitExceeded { limit });
            }
        }

        self.buf
            .try_reserve(incoming)
            .map_err(|_| AccumulateError::Allocation { requested: total })?;

        for chunk in chunks {
            self.buf.extend_from_slice(&chunk.data);
        }

        Ok(Appended {
            added: incoming,
            terminal,
        })
    }

    /// Current accumulated size. Always equal to the buffer length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Copy of the accumulated body.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    /// Body as text for JSON payloads. Invalid UTF-8 is replaced.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_vs_many_chunks_accumulate_identically() {
        let mut one = ChunkAccumulator::new();
        one.append(&[BodyChunk::terminal("hello, world")]).unwrap();

        let mut many = ChunkAccumulator::new();
        many.append(&[BodyChunk::data("hel")]).unwrap();
        many.append(&[BodyChunk::data("lo,"), BodyChunk::data(" wo")])
            .unwrap();
        many.append(&[]).unwrap();
        many.append(&[BodyChunk::data("rld"), BodyChunk::end()])
            .unwrap();

        assert_eq!(one.as_bytes(), many.as_bytes());
        assert_eq!(many.len(), 12);
    }

    #[test]
    fn test_terminal_detected_anywhere_in_batch() {
        let mut acc = ChunkAccumulator::new();
        let first = acc.append(&[BodyChunk::data("a"), BodyChunk::data("b")]).unwrap();
        assert!(!first.terminal);
        assert_eq!(first.added, 2);

        let second = acc
            .append(&[BodyChunk::terminal("c"), BodyChunk::data("d")])
            .unwrap();
        assert!(second.terminal);
        assert_eq!(acc.as_bytes(), b"abcd");
    }

    #[test]
    fn test_empty_batch_keeps_buffer() {
        let mut acc = ChunkAccumulator::new();
        acc.append(&[BodyChunk::data("abc")]).unwrap();
        let ptr = acc.as_bytes().as_ptr();
        let capacity = acc.buf.capacity();

        let appended = acc.append(&[BodyChunk::data(""), BodyChunk::end()]).unwrap();
        assert_eq!(appended, Appended { added: 0, terminal: true });
        assert_eq!(acc.as_bytes().as_ptr(), ptr);
        assert_eq!(acc.buf.capacity(), capacity);
        assert_eq!(acc.as_bytes(), b"abc");
    }

    #[test]
    fn test_limit_rejects_without_dropping_existing_bytes() {
        let mut acc = ChunkAccumulator::with_limit(5);
        acc.append(&[BodyChunk::data("1234")]).unwrap();

        let err = acc.append(&[BodyChunk::data("56")]).unwrap_err();
        assert_eq!(err, AccumulateError::LimitExceeded { limit: 5 });
        assert_eq!(acc.as_bytes(), b"1234");

        acc.append(&[BodyChunk::terminal("5")]).unwrap();
        assert_eq!(acc.as_bytes(), b"12345");
    }

    #[test]
    fn test_lossy_text() {
        let mut acc = ChunkAccumulator::new();
        acc.append(&[BodyChunk::terminal(vec![b'o', b'k', 0xff])]).unwrap();
        assert_eq!(acc.to_string_lossy(), "ok\u{fffd}");
    }
}
