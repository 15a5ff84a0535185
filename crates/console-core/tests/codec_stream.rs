//! Integration tests for the console-core bit codec.
//!
//! These exercise the reader, the Elias-gamma decoder and the writer together
//! through the public API, the way the client's update-stream decoder uses
//! them.

use console_core::codec::{
    read_elias_gamma, read_elias_gamma_lossy, write_elias_gamma, BitReader, BitWriter,
    EliasGammaValues, Overflow,
};

fn gamma_stream(values: &[u32]) -> Vec<u8> {
    let mut writer = BitWriter::new();
    for &v in values {
        write_elias_gamma(&mut writer, v);
    }
    writer.finish()
}

#[test]
fn test_byte_aligned_reads_reconstruct_buffer() {
    let original: Vec<u8> = (0..=255u8).rev().step_by(7).collect();
    let mut reader = BitReader::new(&original);

    let rebuilt: Vec<u8> = (0..original.len())
        .map(|_| reader.read_bits(8).expect("in bounds") as u8)
        .collect();

    assert_eq!(rebuilt, original);
    assert_eq!(reader.remaining_bits(), 0);
    assert!(!reader.is_overflowed());
}

#[test]
fn test_word_reads_cross_byte_boundaries() {
    let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x01];
    let mut reader = BitReader::new(&data);

    assert_eq!(reader.read_bits(4), Ok(0xD));
    assert_eq!(reader.read_bits(32), Ok(0xEADB_EEF0));
    assert_eq!(reader.read_bits(4), Ok(0x1));
    assert_eq!(reader.read_bits(1), Err(Overflow));
}

#[test]
fn test_every_small_value_survives_gamma_coding() {
    for n in 1..=2048u32 {
        let bytes = gamma_stream(&[n]);
        let mut reader = BitReader::new(&bytes);

        assert_eq!(read_elias_gamma(&mut reader), Ok(n), "value {n}");
    }
}

#[test]
fn test_large_values_survive_gamma_coding() {
    for n in [65_535, 1 << 20, 0x7FFF_FFFF, 0x8000_0000, u32::MAX] {
        let bytes = gamma_stream(&[n]);
        let mut reader = BitReader::new(&bytes);

        assert_eq!(read_elias_gamma(&mut reader), Ok(n), "value {n:#x}");
    }
}

#[test]
fn test_concatenated_codewords_decode_in_order() {
    // Arrange
    let values = [1, 2, 3, 4, 13, 1, 1000, 7, 1 << 16, 5];
    let bytes = gamma_stream(&values);

    // Act
    let mut reader = BitReader::new(&bytes);
    let decoded: Vec<u32> = EliasGammaValues::new(&mut reader).take(values.len()).collect();

    // Assert
    assert_eq!(decoded, values);
}

#[test]
fn test_known_codeword_vectors() {
    let mut one = BitReader::new(&[0b1000_0000]);
    let mut three = BitReader::new(&[0b0110_0000]);

    assert_eq!(read_elias_gamma(&mut one), Ok(1));
    assert_eq!(read_elias_gamma(&mut three), Ok(3));
}

#[test]
fn test_overflow_is_sticky_until_reset() {
    // Arrange
    let first = [0xFF];
    let second = [0x80];
    let mut reader = BitReader::new(&first);
    assert_eq!(reader.read_bits(8), Ok(0xFF));

    // Act – one bit past the end, twice
    let a = reader.read_bits(1);
    let b = reader.read_bits(1);

    // Assert
    assert_eq!(a, Err(Overflow));
    assert_eq!(b, Err(Overflow));
    assert_eq!(reader.read_bits_or_zero(1), 0);
    assert!(reader.is_overflowed());

    reader.reset(&second);
    assert!(!reader.is_overflowed());
    assert_eq!(reader.read_bits(1), Ok(1));
}

#[test]
fn test_truncated_frame_is_detected_once_at_the_end() {
    // Arrange – drop the last byte of a three-value stream
    let mut bytes = gamma_stream(&[300, 300, 300]);
    bytes.pop();

    // Act – legacy decoding never fails midway
    let mut reader = BitReader::new(&bytes);
    let _values: Vec<u32> = (0..3).map(|_| read_elias_gamma_lossy(&mut reader)).collect();

    // Assert
    assert!(reader.is_overflowed());
}
