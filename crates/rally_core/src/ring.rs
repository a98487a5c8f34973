//! Fixed-capacity circular byte store with delimiter-seeking reads.
//!
//! Sessions use two of these per connection: one for inbound request bytes and one for outbound response bytes.
//! Framing is newline-delimited, so the read side only ever hands out complete frames.
//!
//! # Invariants
//! - The backing store holds `capacity + 1` bytes. The extra sentinel slot keeps "full" distinguishable from
//!   "empty": `write_head == read_head` always means empty.
//! - A write never moves `write_head` onto or past `read_head`. That would be overflow.
//! - A rollback never moves `read_head` back over bytes that are still unread. That would be underflow.
//!
//! # Edge cases
//! - Capacity 0 is legal. The buffer is always empty, empty writes succeed, any non-empty write overflows and reads
//!   return `None`.

use thiserror::Error;

/// Errors raised by [`RingBuffer`] operations. Neither error mutates the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("ring buffer overflow: {requested} byte(s) requested, {available} available")]
    Overflow { requested: usize, available: usize },

    #[error("ring buffer underflow: cannot roll back {requested} byte(s), at most {available} allowed")]
    Underflow { requested: usize, available: usize },
}

/// Circular byte buffer with all-or-nothing writes and delimiter-terminated reads.
pub struct RingBuffer {
    buf: Vec<u8>,
    write_head: usize,
    read_head: usize,
}

impl RingBuffer {
    /// Creates an empty buffer able to hold `capacity` bytes at once.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity + 1],
            write_head: 0,
            read_head: 0,
        }
    }

    /// Returns the maximum number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.buf.len() - 1
    }

    /// Returns the number of unread bytes.
    pub fn len(&self) -> usize {
        let size = self.buf.len();
        (self.write_head + size - self.read_head) % size
    }

    /// Returns true when there is nothing left to read.
    pub fn is_empty(&self) -> bool {
        self.write_head == self.read_head
    }

    /// Returns the number of bytes that can be written right now.
    pub fn available_space(&self) -> usize {
        let size = self.buf.len();
        (self.read_head + size - self.write_head - 1) % size
    }

    /// Appends all of `bytes`, or nothing at all.
    ///
    /// Complexity: O(n) for `n = bytes.len()`.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), RingError> {
        let available = self.available_space();
        if bytes.len() > available {
            return Err(RingError::Overflow {
                requested: bytes.len(),
                available,
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let size = self.buf.len();
        let first = (size - self.write_head).min(bytes.len());
        self.buf[self.write_head..self.write_head + first].copy_from_slice(&bytes[..first]);
        let rest = bytes.len() - first;
        if rest > 0 {
            self.buf[..rest].copy_from_slice(&bytes[first..]);
        }
        self.write_head = (self.write_head + bytes.len()) % size;
        Ok(())
    }

    /// Reads up to and including the first `delimiter`, if one has been written.
    ///
    /// When no unread byte equals `delimiter`, nothing is consumed and `None` is returned. Otherwise the returned
    /// span ends with the delimiter and `read_head` moves past it.
    pub fn read_up_to(&mut self, delimiter: u8) -> Option<Vec<u8>> {
        let (head, tail) = self.unread_segments();

        let span = match head.iter().position(|&b| b == delimiter) {
            Some(index) => head[..=index].to_vec(),
            None => {
                let index = tail.iter().position(|&b| b == delimiter)?;
                let mut span = Vec::with_capacity(head.len() + index + 1);
                span.extend_from_slice(head);
                span.extend_from_slice(&tail[..=index]);
                span
            }
        };

        self.read_head = (self.read_head + span.len()) % self.buf.len();
        Some(span)
    }

    /// Moves `read_head` back by `count` bytes so they will be read again.
    ///
    /// Only bytes that were actually read may be rolled back. Rolling back into space that holds unread data (or was
    /// never written) fails with [`RingError::Underflow`] and leaves the buffer untouched.
    pub fn rollback(&mut self, count: usize) -> Result<(), RingError> {
        let available = self.available_space();
        if count > available {
            return Err(RingError::Underflow {
                requested: count,
                available,
            });
        }
        let size = self.buf.len();
        self.read_head = (self.read_head + size - count) % size;
        Ok(())
    }

    /// Returns the unread bytes as up to two slices in logical order.
    fn unread_segments(&self) -> (&[u8], &[u8]) {
        if self.read_head <= self.write_head {
            (&self.buf[self.read_head..self.write_head], &[])
        } else {
            (&self.buf[self.read_head..], &self.buf[..self.write_head])
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("read_head", &self.read_head)
            .field("write_head", &self.write_head)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_empty_with_full_space() {
        let ring = RingBuffer::with_capacity(8);
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.capacity(), 8);
        assert_eq!(ring.available_space(), 8);
    }

    #[test]
    fn write_exact_capacity_then_read_everything() {
        let mut ring = RingBuffer::with_capacity(5);
        ring.write(b"abcd\n").unwrap();
        assert_eq!(ring.available_space(), 0);
        assert_eq!(ring.read_up_to(b'\n').unwrap(), b"abcd\n");
        assert!(ring.is_empty());
        assert_eq!(ring.available_space(), 5);
    }

    #[test]
    fn read_without_delimiter_consumes_nothing() {
        let mut ring = RingBuffer::with_capacity(16);
        ring.write(b"partial").unwrap();
        assert_eq!(ring.read_up_to(b'\n'), None);
        assert_eq!(ring.len(), 7);

        ring.write(b" frame\nnext").unwrap();
        assert_eq!(ring.read_up_to(b'\n').unwrap(), b"partial frame\n");
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn overflow_leaves_buffer_untouched() {
        let mut ring = RingBuffer::with_capacity(4);
        ring.write(b"ab").unwrap();
        let err = ring.write(b"cde").unwrap_err();
        assert_eq!(
            err,
            RingError::Overflow {
                requested: 3,
                available: 2
            }
        );
        assert_eq!(ring.len(), 2);
        ring.write(b"\n").unwrap();
        assert_eq!(ring.read_up_to(b'\n').unwrap(), b"ab\n");
    }

    #[test]
    fn frames_wrap_around_the_end() {
        let mut ring = RingBuffer::with_capacity(6);
        ring.write(b"1234\n").unwrap();
        assert_eq!(ring.read_up_to(b'\n').unwrap(), b"1234\n");

        // write head is at 5 of 7 slots; this frame wraps
        ring.write(b"wxyz\n").unwrap();
        assert_eq!(ring.read_up_to(b'\n').unwrap(), b"wxyz\n");
        assert!(ring.is_empty());
        assert_eq!(ring.available_space(), 6);
    }

    #[test]
    fn delimiter_found_in_wrapped_tail() {
        let mut ring = RingBuffer::with_capacity(6);
        ring.write(b"abcde").unwrap();
        assert_eq!(ring.read_up_to(b'e').unwrap(), b"abcde");
        ring.write(b"fg").unwrap();
        ring.write(b"h\n").unwrap();
        assert_eq!(ring.read_up_to(b'\n').unwrap(), b"fgh\n");
    }

    #[test]
    fn rollback_resends_same_bytes() {
        let mut ring = RingBuffer::with_capacity(8);
        ring.write(b"hello\n").unwrap();
        let first = ring.read_up_to(b'\n').unwrap();
        ring.rollback(3).unwrap();
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.read_up_to(b'\n').unwrap(), &first[3..]);
    }

    #[test]
    fn rollback_across_wrap_boundary() {
        let mut ring = RingBuffer::with_capacity(4);
        ring.write(b"ab\n").unwrap();
        ring.read_up_to(b'\n').unwrap();
        ring.write(b"cd\n").unwrap();
        let frame = ring.read_up_to(b'\n').unwrap();
        assert_eq!(frame, b"cd\n");
        ring.rollback(frame.len()).unwrap();
        assert_eq!(ring.read_up_to(b'\n').unwrap(), b"cd\n");
    }

    #[test]
    fn rollback_past_unread_data_is_underflow() {
        let mut ring = RingBuffer::with_capacity(4);
        ring.write(b"a\n").unwrap();
        ring.read_up_to(b'\n').unwrap();
        ring.write(b"bc").unwrap();
        // 2 bytes read, 2 unread: only 2 slots may be rolled back
        assert!(matches!(ring.rollback(3), Err(RingError::Underflow { .. })));
        assert_eq!(ring.len(), 2);
        ring.rollback(2).unwrap();
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn zero_capacity_is_always_empty() {
        let mut ring = RingBuffer::with_capacity(0);
        assert!(ring.is_empty());
        assert_eq!(ring.available_space(), 0);
        ring.write(b"").unwrap();
        assert!(matches!(ring.write(b"\n"), Err(RingError::Overflow { .. })));
        assert_eq!(ring.read_up_to(b'\n'), None);
        ring.rollback(0).unwrap();
        assert!(ring.rollback(1).is_err());
    }
}
