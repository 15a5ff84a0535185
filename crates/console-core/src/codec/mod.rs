//! Bit-granular decoding of the screen-update stream.

pub mod bit_reader;
pub mod bit_writer;
pub mod elias_gamma;

pub use bit_reader::{BitReader, Overflow, MAX_READ_BITS};
pub use bit_writer::{write_elias_gamma, BitWriter};
pub use elias_gamma::{read_elias_gamma, read_elias_gamma_lossy, EliasGammaValues, MAX_PREFIX_BITS};
