//! MSB-first bit reader over a borrowed byte buffer.
//!
//! # How bits are consumed (for beginners)
//!
//! Screen-update payloads are not byte aligned: integers are packed back to
//! back at bit granularity.  The reader keeps one byte "loaded" together with
//! the number of bits of it that have not been handed out yet.  A request for
//! `n` bits drains the loaded byte from its most significant end, loads the
//! next byte from the buffer when the current one runs dry, and repeats until
//! `n` bits have been collected.
//!
//! ```text
//! buffer:   1011_0010  0110_0000
//!           ^^^        read_bits(3) -> 0b101
//!              ^^^^^^^ read_bits(7) -> 0b100_1001  (crosses the byte boundary)
//! ```
//!
//! # Overflow
//!
//! When a request cannot be satisfied the reader enters the *overflow* state.
//! Overflow is sticky: every later read fails immediately without touching
//! the cursor, until [`BitReader::reset`] binds a new buffer.  Callers that
//! forget to check still terminate, because each failing read is O(1).

use thiserror::Error;
use tracing::trace;

/// Largest request [`BitReader::read_bits`] can satisfy in one call.
pub const MAX_READ_BITS: u32 = 32;

/// The buffer was exhausted before a read could be satisfied.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("bit reader overflow: input exhausted")]
pub struct Overflow;

/// Reads bits most-significant-first from a byte slice the caller owns.
///
/// One reader serves one decode pass.  It holds no state worth keeping between
/// buffers; use [`BitReader::reset`] (or a fresh reader) for the next buffer.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    buf: &'a [u8],
    /// Number of bytes loaded from `buf` so far.
    cursor: usize,
    /// The byte currently being drained.
    current: u8,
    /// Bits of `current` not yet returned (0..=8).
    bits_left: u32,
    overflow: bool,
}

impl<'a> BitReader<'a> {
    /// Creates a reader over `buf`.  The declared size is `buf.len()`; pass a
    /// sub-slice to declare a shorter one.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            cursor: 0,
            current: 0,
            bits_left: 0,
            overflow: false,
        }
    }

    /// Rebinds the reader to `buf` and clears the cursor, the loaded byte and
    /// the overflow flag.
    pub fn reset(&mut self, buf: &'a [u8]) {
        *self = Self::new(buf);
    }

    /// Reads the next `n` bits as an unsigned integer, MSB first.
    ///
    /// `n == 0` always succeeds with `0`.  Partial accumulation is discarded
    /// when the buffer runs out, so a failed read never yields a truncated
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`Overflow`] when fewer than `n` bits remain, when `n` exceeds
    /// [`MAX_READ_BITS`], or when the reader already overflowed.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, Overflow> {
        if self.overflow {
            return Err(Overflow);
        }
        if n > MAX_READ_BITS {
            return Err(self.set_overflow(n));
        }

        let mut wanted = n;
        let mut acc: u64 = 0;

        while wanted > self.bits_left {
            // Take everything left in the current byte.
            if self.bits_left > 0 {
                let mask = (1u32 << self.bits_left) - 1;
                acc = (acc << self.bits_left) | u64::from(u32::from(self.current) & mask);
                wanted -= self.bits_left;
                self.bits_left = 0;
            }

            match self.buf.get(self.cursor) {
                Some(&byte) => {
                    self.current = byte;
                    self.bits_left = 8;
                    self.cursor += 1;
                }
                None => return Err(self.set_overflow(n)),
            }
        }

        if wanted > 0 {
            let shift = self.bits_left - wanted;
            let mask = (1u32 << wanted) - 1;
            let bits = (u32::from(self.current) >> shift) & mask;
            acc = (acc << wanted) | u64::from(bits);
            self.bits_left = shift;
        }

        // `n <= 32`, so the accumulator always fits.
        Ok(acc as u32)
    }

    /// Legacy sentinel form of [`read_bits`](Self::read_bits): returns `0`
    /// instead of an error.  Check [`is_overflowed`](Self::is_overflowed)
    /// after the decode pass.
    pub fn read_bits_or_zero(&mut self, n: u32) -> u32 {
        self.read_bits(n).unwrap_or(0)
    }

    /// Reads a single bit.
    ///
    /// # Errors
    ///
    /// Returns [`Overflow`] once the input is exhausted.
    pub fn read_bit(&mut self) -> Result<bool, Overflow> {
        self.read_bits(1).map(|b| b == 1)
    }

    /// `true` once a read has failed; stays `true` until [`reset`](Self::reset).
    pub fn is_overflowed(&self) -> bool {
        self.overflow
    }

    /// Number of bytes loaded from the buffer so far (including the one being
    /// drained).
    pub fn bytes_consumed(&self) -> usize {
        self.cursor
    }

    /// Bits that can still be read before overflow.
    pub fn remaining_bits(&self) -> usize {
        if self.overflow {
            return 0;
        }
        (self.buf.len() - self.cursor) * 8 + self.bits_left as usize
    }

    /// Declared size of the bound buffer in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// `true` when the bound buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Forces the overflow state, used when the bits decode to something that
    /// cannot be represented (e.g. an over-long Elias-gamma prefix).
    pub(crate) fn poison(&mut self) {
        self.overflow = true;
    }

    fn set_overflow(&mut self, requested: u32) -> Overflow {
        trace!(
            requested,
            cursor = self.cursor,
            size = self.buf.len(),
            "bit reader overflow"
        );
        self.overflow = true;
        Overflow
    }
}
