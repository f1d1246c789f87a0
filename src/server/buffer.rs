//! Growable per-connection request buffer with the two-cursor discipline.

use crate::{http::types, limits::ReqLimits};
use std::{collections::TryReserveError, io, time::Duration};
use tokio::{io::AsyncReadExt, net::TcpStream, time::sleep};

/// Owned request buffer with `parse_offset <= read_offset <= capacity`.
///
/// `read_offset` counts bytes read from the socket, `parse_offset` bytes
/// consumed by completed requests. Reads fill `[read_offset .. capacity-1]`;
/// the final byte is never written so the buffer can always hold a request
/// of exactly the configured maximum.
#[derive(Debug)]
pub(crate) struct ConnectionBuffer {
    data: Vec<u8>,
    pub(crate) read_offset: usize,
    pub(crate) parse_offset: usize,
    initial: usize,
    max: usize,
}

impl ConnectionBuffer {
    #[inline]
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        Self {
            data: vec![0; limits.initial_capacity],
            read_offset: 0,
            parse_offset: 0,
            initial: limits.initial_capacity,
            max: limits.max_capacity,
        }
    }

    /// Returns the buffer to its per-connection starting state, shedding
    /// any growth a previous connection caused.
    pub(crate) fn reset(&mut self) {
        if self.data.len() > self.initial {
            self.data = vec![0; self.initial];
        }
        self.read_offset = 0;
        self.parse_offset = 0;
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub(crate) fn max_capacity(&self) -> usize {
        self.max
    }

    #[inline(always)]
    pub(crate) fn filled(&self) -> &[u8] {
        &self.data[..self.read_offset]
    }

    #[inline(always)]
    pub(crate) fn is_full(&self) -> bool {
        self.read_offset >= self.data.len() - 1
    }

    /// Position of the `\r\n\r\n` terminating the next unparsed header
    /// block, if fully buffered.
    #[inline]
    pub(crate) fn find_header_end(&self) -> Option<usize> {
        types::find(&self.data[self.parse_offset..self.read_offset], b"\r\n\r\n")
            .map(|at| self.parse_offset + at)
    }

    /// Reads once from the socket, bounded by `timeout`. `Ok(0)` is peer
    /// EOF; expiry surfaces as [`io::ErrorKind::TimedOut`].
    pub(crate) async fn fill(
        &mut self,
        stream: &mut TcpStream,
        timeout: Duration,
    ) -> io::Result<usize> {
        debug_assert!(!self.is_full());
        let writable_end = self.data.len() - 1;

        tokio::select! {
            biased;

            read = stream.read(&mut self.data[self.read_offset..writable_end]) => {
                let n = read?;
                self.read_offset += n;
                Ok(n)
            }
            _ = sleep(timeout) => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"))
            }
        }
    }

    /// Grows the buffer to exactly `target` bytes. The caller has already
    /// checked `target` against [`max_capacity`](Self::max_capacity);
    /// allocator refusal is reported, not aborted on.
    pub(crate) fn grow(&mut self, target: usize) -> Result<(), TryReserveError> {
        debug_assert!(target > self.data.len());
        self.data.try_reserve_exact(target - self.data.len())?;
        self.data.resize(target, 0);
        Ok(())
    }

    /// Moves unparsed bytes to the buffer front after completed requests.
    /// Safe for overlapping ranges.
    pub(crate) fn shift(&mut self) {
        let remaining = self.read_offset - self.parse_offset;
        if remaining > 0 && self.parse_offset > 0 {
            self.data.copy_within(self.parse_offset..self.read_offset, 0);
        }
        self.read_offset = remaining;
        self.parse_offset = 0;
        self.assert_cursors();
    }

    #[inline(always)]
    fn assert_cursors(&self) {
        debug_assert!(self.parse_offset <= self.read_offset);
        debug_assert!(self.read_offset <= self.data.len());
        debug_assert!(self.data.len() <= self.max + 1);
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(limits: &ReqLimits, bytes: &[u8]) -> Self {
        let mut buffer = Self::new(limits);
        buffer.data[..bytes.len()].copy_from_slice(bytes);
        buffer.read_offset = bytes.len();
        buffer
    }
}
