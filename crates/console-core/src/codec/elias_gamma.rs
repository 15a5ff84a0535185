//! Elias-gamma decoding of positive integers.
//!
//! A codeword for `n >= 1` is `floor(log2(n))` zero bits, a one bit, then the
//! low `floor(log2(n))` bits of `n`:
//!
//! ```text
//!   1  ->  1
//!   2  ->  010
//!   3  ->  011
//!   4  ->  00100
//!  13  ->  0001101
//! ```
//!
//! Codewords are packed back to back with no byte realignment, which is why
//! decoding works on a [`BitReader`] rather than on bytes.

use tracing::trace;

use crate::codec::bit_reader::{BitReader, Overflow};

/// Longest zero prefix that still yields a value representable in `u32`.
pub const MAX_PREFIX_BITS: u32 = 31;

/// Decodes one Elias-gamma codeword.
///
/// # Errors
///
/// Returns [`Overflow`] when the codeword is cut short by the end of the
/// buffer, or when the zero prefix is longer than [`MAX_PREFIX_BITS`].  In
/// both cases the reader is left in the overflow state.
///
/// # Examples
///
/// ```rust
/// use console_core::codec::{read_elias_gamma, BitReader};
///
/// let data = [0b0110_0000];
/// let mut reader = BitReader::new(&data);
/// assert_eq!(read_elias_gamma(&mut reader), Ok(3));
/// ```
pub fn read_elias_gamma(reader: &mut BitReader<'_>) -> Result<u32, Overflow> {
    let prefix = read_prefix(reader)?;
    let mut value = 1u32 << prefix;
    if prefix > 0 {
        value |= reader.read_bits(prefix)?;
    }
    Ok(value)
}

/// Decodes one codeword the way the legacy stream decoder did: no error is
/// returned, so a truncated buffer silently yields a (possibly wrong) small
/// value.  The caller must check [`BitReader::is_overflowed`] before trusting
/// anything decoded in the same pass.
pub fn read_elias_gamma_lossy(reader: &mut BitReader<'_>) -> u32 {
    let mut prefix = 0u32;
    loop {
        let bit = reader.read_bits_or_zero(1);
        // Stop on the sentinel instead of counting zeros forever.
        if reader.is_overflowed() || bit == 1 {
            break;
        }
        if prefix == MAX_PREFIX_BITS {
            reader.poison();
            break;
        }
        prefix += 1;
    }

    let mut value = 1u32 << prefix;
    if prefix > 0 {
        value |= reader.read_bits_or_zero(prefix);
    }
    value
}

fn read_prefix(reader: &mut BitReader<'_>) -> Result<u32, Overflow> {
    let mut prefix = 0u32;
    while !reader.read_bit()? {
        if prefix == MAX_PREFIX_BITS {
            trace!("elias-gamma prefix longer than {MAX_PREFIX_BITS} bits");
            reader.poison();
            return Err(Overflow);
        }
        prefix += 1;
    }
    Ok(prefix)
}

/// Iterator over consecutive codewords; ends at the first overflow.
///
/// Trailing zero padding in the last byte ends the iteration as well, since a
/// prefix of padding zeros runs into the end of the buffer.
pub struct EliasGammaValues<'r, 'a> {
    reader: &'r mut BitReader<'a>,
}

impl<'r, 'a> EliasGammaValues<'r, 'a> {
    /// Wraps `reader`; values are read lazily.
    pub fn new(reader: &'r mut BitReader<'a>) -> Self {
        Self { reader }
    }
}

impl Iterator for EliasGammaValues<'_, '_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        read_elias_gamma(self.reader).ok()
    }
}
