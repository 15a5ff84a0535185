//! UpdateStreamDecoder: frame-level decoding of the screen-update stream.
//!
//! An update frame is a run of Elias-gamma codewords packed back to back.
//! The frame header (owned by the transport) says how many values follow; the
//! decoder reads exactly that many and aborts the whole frame if the data runs
//! out first.  A partially decoded frame is never handed on.

use console_core::codec::{read_elias_gamma, BitReader, EliasGammaValues};
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for update-frame decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpdateError {
    /// The frame ended before all announced values were read.
    #[error("update frame truncated after {decoded} values")]
    Truncated { decoded: usize },
}

/// Decodes update frames and counts the outcome of each.
#[derive(Debug, Default)]
pub struct UpdateStreamDecoder {
    frames_decoded: u64,
    frames_aborted: u64,
}

impl UpdateStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes exactly `count` values from `bytes`.
    ///
    /// Bits left over after the last value (byte padding) are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Truncated`] with the number of values that were
    /// complete when the buffer ran out.
    pub fn decode_frame(&mut self, bytes: &[u8], count: usize) -> Result<Vec<u32>, UpdateError> {
        let mut reader = BitReader::new(bytes);
        // `count` comes off the wire; every codeword is at least one bit.
        let mut values = Vec::with_capacity(count.min(bytes.len().saturating_mul(8)));
        for _ in 0..count {
            match read_elias_gamma(&mut reader) {
                Ok(v) => values.push(v),
                Err(_) => {
                    self.frames_aborted += 1;
                    warn!(
                        decoded = values.len(),
                        expected = count,
                        len = bytes.len(),
                        "update frame aborted: data truncated"
                    );
                    return Err(UpdateError::Truncated {
                        decoded: values.len(),
                    });
                }
            }
        }
        self.frames_decoded += 1;
        debug!(values = count, bytes = reader.bytes_consumed(), "update frame decoded");
        Ok(values)
    }

    /// Decodes every complete codeword in `bytes`, stopping at the first
    /// truncated one.  Used when the value count is not known.
    pub fn decode_all(&mut self, bytes: &[u8]) -> Vec<u32> {
        let mut reader = BitReader::new(bytes);
        let values: Vec<u32> = EliasGammaValues::new(&mut reader).collect();
        self.frames_decoded += 1;
        debug!(values = values.len(), "update stream scanned");
        values
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_aborted(&self) -> u64 {
        self.frames_aborted
    }
}
