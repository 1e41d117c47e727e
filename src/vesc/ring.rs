//! Interrupt-fed byte ring buffer for the serial link.
//!
//! Producer: the UART receive ISR, one byte per call. Consumer: the frame
//! extractor, in main-loop context. Same single-consumer, short-critical-
//! section discipline as the event queue, with one reserved slot for
//! full/empty disambiguation.

use crate::error::{Error, Result};

/// Ring capacity; `CAP - 1` bytes usable. Sized for a few worst-case frames
/// of backlog between line-idle events.
pub const RX_RING_CAP: usize = 128;

#[derive(Debug)]
pub struct ByteRing {
    buf: [u8; RX_RING_CAP],
    head: usize,
    tail: usize,
}

impl ByteRing {
    pub fn new() -> Self {
        Self {
            buf: [0; RX_RING_CAP],
            head: 0,
            tail: 0,
        }
    }

    /// Append one byte. Callable from ISR context.
    pub fn push(&mut self, byte: u8) -> Result<()> {
        critical_section::with(|_| {
            let next_tail = (self.tail + 1) % RX_RING_CAP;
            if next_tail == self.head {
                return Err(Error::QueueFull);
            }
            self.buf[self.tail] = byte;
            self.tail = next_tail;
            Ok(())
        })
    }

    /// Append a slice; stops at the first byte that does not fit.
    pub fn push_slice(&mut self, bytes: &[u8]) -> Result<()> {
        for &b in bytes {
            self.push(b)?;
        }
        Ok(())
    }

    /// Remove and return the oldest byte. Single consumer only.
    pub fn pop(&mut self) -> Option<u8> {
        if self.head == self.tail {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % RX_RING_CAP;
        Some(byte)
    }

    /// Oldest byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        if self.head == self.tail {
            None
        } else {
            Some(self.buf[self.head])
        }
    }

    /// Byte at `offset` from the oldest, without consuming anything.
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        if offset >= self.len() {
            return None;
        }
        Some(self.buf[(self.head + offset) % RX_RING_CAP])
    }

    /// Discard `n` bytes (or everything, if fewer are buffered).
    pub fn skip(&mut self, n: usize) {
        let n = n.min(self.len());
        self.head = (self.head + n) % RX_RING_CAP;
    }

    pub fn len(&self) -> usize {
        (self.tail + RX_RING_CAP - self.head) % RX_RING_CAP
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }
}
