//! Per-connection framing state.
//!
//! A session owns two [`RingBuffer`]s. Inbound bytes accumulate until a `\n` completes a request frame. Outbound
//! responses are queued as whole frames and flushed one frame per writable event. A short write rolls back the
//! unwritten suffix so the next flush resends exactly the remainder.

use std::io::{self, Read, Write};

use rally_core::{RingBuffer, RingError};

/// Capacity of each of a session's buffers, which is also the largest frame a session can carry.
pub const FRAME_CAPACITY: usize = 64 * 1024;

const DELIMITER: u8 = b'\n';

/// Process-unique, sequential from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of [`Session::read_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The peer is still connected. Zero or more bytes were buffered.
    Open,
    /// The peer closed its write half.
    Eof,
    /// The inbound buffer has no free space. Nothing was read.
    Full,
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    inbound: RingBuffer,
    outbound: RingBuffer,
    terminated: bool,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self::with_capacity(id, FRAME_CAPACITY)
    }

    pub fn with_capacity(id: SessionId, capacity: usize) -> Self {
        Self {
            id,
            inbound: RingBuffer::with_capacity(capacity),
            outbound: RingBuffer::with_capacity(capacity),
            terminated: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Reads whatever is available, bounded by the inbound buffer's free space.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> io::Result<ReadStatus> {
        let free = self.inbound.available_space();
        if free == 0 {
            return Ok(ReadStatus::Full);
        }
        let mut chunk = vec![0u8; free];
        match reader.read(&mut chunk) {
            Ok(0) => Ok(ReadStatus::Eof),
            Ok(n) => {
                self.inbound.write(&chunk[..n]).map_err(io::Error::other)?;
                Ok(ReadStatus::Open)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Ok(ReadStatus::Open)
            }
            Err(e) => Err(e),
        }
    }

    /// Pops one complete request frame, without its delimiter. The bytes are handed over as received.
    pub fn next_request(&mut self) -> Option<Vec<u8>> {
        let mut frame = self.inbound.read_up_to(DELIMITER)?;
        frame.pop();
        if frame.last() == Some(&b'\r') {
            frame.pop();
        }
        Some(frame)
    }

    /// Queues `text` plus the delimiter as one outbound frame.
    pub fn queue_response(&mut self, text: &str) -> Result<(), RingError> {
        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(DELIMITER);
        self.outbound.write(&frame)
    }

    /// Writes at most one outbound frame.
    ///
    /// Returns `Ok(true)` when a whole frame (or the remainder of a partially sent one) went out, `Ok(false)` when
    /// nothing was pending or the socket took only part of it.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> io::Result<bool> {
        let Some(frame) = self.outbound.read_up_to(DELIMITER) else {
            return Ok(false);
        };
        match writer.write(&frame) {
            Ok(n) if n == frame.len() => Ok(true),
            Ok(n) => {
                self.requeue(frame.len() - n)?;
                Ok(false)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                self.requeue(frame.len())?;
                Ok(false)
            }
            Err(e) => {
                self.requeue(frame.len())?;
                Err(e)
            }
        }
    }

    fn requeue(&mut self, unsent: usize) -> io::Result<()> {
        self.outbound.rollback(unsent).map_err(io::Error::other)
    }

    /// No room is left for request bytes, so a frame that is still incomplete can never complete.
    pub fn inbound_is_full(&self) -> bool {
        self.inbound.available_space() == 0
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// No further requests will be read from this session.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Terminated and fully flushed: the socket can be closed.
    pub fn is_done(&self) -> bool {
        self.terminated && self.outbound.is_empty()
    }
}
