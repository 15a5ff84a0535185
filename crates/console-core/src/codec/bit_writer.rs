//! MSB-first bit packer, the encoding counterpart of [`BitReader`].
//!
//! The client never encodes update data itself; the writer exists so tests,
//! benchmarks and fixture tooling can produce streams that the decoder then
//! consumes.
//!
//! [`BitReader`]: crate::codec::BitReader

/// Packs bits most-significant-first into a growing byte vector.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Bits already used in the last byte of `bytes` (0 means byte aligned).
    used: u32,
}

impl BitWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `n` bits of `value`, MSB first.  `n` is capped at 32.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        let n = n.min(32);
        for i in (0..n).rev() {
            let bit = ((value >> i) & 1) as u8;
            if self.used == 0 {
                self.bytes.push(0);
            }
            if let Some(last) = self.bytes.last_mut() {
                *last |= bit << (7 - self.used);
            }
            self.used = (self.used + 1) % 8;
        }
    }

    /// Total number of bits written so far.
    pub fn bit_len(&self) -> usize {
        if self.used == 0 {
            self.bytes.len() * 8
        } else {
            (self.bytes.len() - 1) * 8 + self.used as usize
        }
    }

    /// Returns the packed bytes; the final partial byte is zero padded.
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Appends the Elias-gamma codeword for `value`.  Zero has no codeword and is
/// written as `1`.
pub fn write_elias_gamma(writer: &mut BitWriter, value: u32) {
    let value = value.max(1);
    let prefix = 31 - value.leading_zeros();
    writer.write_bits(0, prefix);
    writer.write_bits(1, 1);
    writer.write_bits(value, prefix);
}
