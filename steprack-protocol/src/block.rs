// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Binary block framing for table and firmware uploads.
//!
//! After the ASCII header command (`*ECAMDAT …`, `*LISTDAT …`, `*PARDAT …`,
//! `*PROG …`) the host sends one binary frame:
//!
//! ```text
//! start_mark : u32 LE = 0xA5AA555A
//! word_count : u32 LE   number of 16-bit payload words
//! checksum   : u32 LE   sum of payload words, modulo 2^32
//! payload    : word_count x u16 LE
//! ```
//!
//! followed by a single `\r`. Table payloads of floats, doubles, signed
//! 32-bit integers or signed bytes are reinterpreted as a little-endian
//! u16 sequence before framing.

use crate::ProtocolError;
use bytes::{BufMut, BytesMut};

/// Frame start marker.
pub const START_MARK: u32 = 0xA5AA_555A;

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 12;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub word_count: u32,
    pub checksum: u32,
}

/// Payload checksum: the u16 words summed into an unsigned 32-bit
/// accumulator with wrap-around.
pub fn checksum(words: &[u16]) -> u32 {
    words
        .iter()
        .fold(0u32, |acc, w| acc.wrapping_add(*w as u32))
}

/// Assemble the complete wire frame (header, payload, trailing `\r`).
pub fn encode_block(words: &[u16]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + words.len() * 2 + 1);
    buf.put_u32_le(START_MARK);
    buf.put_u32_le(words.len() as u32);
    buf.put_u32_le(checksum(words));
    for word in words {
        buf.put_u16_le(*word);
    }
    buf.put_u8(b'\r');
    buf.to_vec()
}

/// Parse and validate a frame header. The payload itself is read
/// separately once the length is known.
pub fn decode_header(bytes: &[u8]) -> Result<BlockHeader, ProtocolError> {
    if bytes.len() < HEADER_LEN {
        return Err(ProtocolError::Frame(format!(
            "truncated block header: {} bytes",
            bytes.len()
        )));
    }
    let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
    let mark = word(0);
    if mark != START_MARK {
        return Err(ProtocolError::Frame(format!(
            "bad start mark 0x{mark:08X}"
        )));
    }
    Ok(BlockHeader {
        word_count: word(4),
        checksum: word(8),
    })
}

/// Split a raw payload into its u16 words, checking length and checksum
/// against the header.
pub fn decode_payload(header: &BlockHeader, bytes: &[u8]) -> Result<Vec<u16>, ProtocolError> {
    if bytes.len() != header.word_count as usize * 2 {
        return Err(ProtocolError::Frame(format!(
            "payload length {} does not match word count {}",
            bytes.len(),
            header.word_count
        )));
    }
    let words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let sum = checksum(&words);
    if sum != header.checksum {
        return Err(ProtocolError::Frame(format!(
            "checksum mismatch: header 0x{:08X}, payload 0x{sum:08X}",
            header.checksum
        )));
    }
    Ok(words)
}

fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u16>, ProtocolError> {
    if bytes.len() % 2 != 0 {
        return Err(ProtocolError::Frame(format!(
            "byte payload of odd length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Reinterpret 32-bit floats as u16 words (two per value).
pub fn words_from_f32(values: &[f32]) -> Vec<u16> {
    let mut words = Vec::with_capacity(values.len() * 2);
    for value in values {
        let b = value.to_le_bytes();
        words.push(u16::from_le_bytes([b[0], b[1]]));
        words.push(u16::from_le_bytes([b[2], b[3]]));
    }
    words
}

/// Reinterpret 64-bit floats as u16 words (four per value).
pub fn words_from_f64(values: &[f64]) -> Vec<u16> {
    let mut words = Vec::with_capacity(values.len() * 4);
    for value in values {
        let b = value.to_le_bytes();
        for pair in b.chunks_exact(2) {
            words.push(u16::from_le_bytes([pair[0], pair[1]]));
        }
    }
    words
}

/// Reinterpret signed 32-bit integers as u16 words (two per value).
pub fn words_from_i32(values: &[i32]) -> Vec<u16> {
    let mut words = Vec::with_capacity(values.len() * 2);
    for value in values {
        let b = value.to_le_bytes();
        words.push(u16::from_le_bytes([b[0], b[1]]));
        words.push(u16::from_le_bytes([b[2], b[3]]));
    }
    words
}

/// Reinterpret signed bytes as u16 words (two bytes per word); the byte
/// count must be even.
pub fn words_from_i8(values: &[i8]) -> Result<Vec<u16>, ProtocolError> {
    let bytes: Vec<u8> = values.iter().map(|v| *v as u8).collect();
    words_from_bytes(&bytes)
}

/// Reinterpret an opaque byte buffer (firmware images) as u16 words. A
/// trailing odd byte is zero-padded, matching how images are stored.
pub fn words_from_image(bytes: &[u8]) -> Vec<u16> {
    let mut words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    if bytes.len() % 2 != 0 {
        words.push(bytes[bytes.len() - 1] as u16);
    }
    words
}

/// Inverse of [`words_from_f32`], used when dumping tables back.
pub fn f32_from_words(words: &[u16]) -> Vec<f32> {
    words
        .chunks_exact(2)
        .map(|pair| {
            let lo = pair[0].to_le_bytes();
            let hi = pair[1].to_le_bytes();
            f32::from_le_bytes([lo[0], lo[1], hi[0], hi[1]])
        })
        .collect()
}

/// Inverse of [`words_from_f64`].
pub fn f64_from_words(words: &[u16]) -> Vec<f64> {
    words
        .chunks_exact(4)
        .map(|quad| {
            let mut bytes = [0u8; 8];
            for (i, word) in quad.iter().enumerate() {
                let b = word.to_le_bytes();
                bytes[i * 2] = b[0];
                bytes[i * 2 + 1] = b[1];
            }
            f64::from_le_bytes(bytes)
        })
        .collect()
}

/// Inverse of [`words_from_i32`].
pub fn i32_from_words(words: &[u16]) -> Vec<i32> {
    words
        .chunks_exact(2)
        .map(|pair| {
            let lo = pair[0].to_le_bytes();
            let hi = pair[1].to_le_bytes();
            i32::from_le_bytes([lo[0], lo[1], hi[0], hi[1]])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let words = [0x1234u16, 0xABCD];
        let frame = encode_block(&words);
        assert_eq!(frame.len(), HEADER_LEN + 4 + 1);
        assert_eq!(&frame[0..4], &[0x5A, 0x55, 0xAA, 0xA5]);
        assert_eq!(&frame[4..8], &[2, 0, 0, 0]);
        let sum = 0x1234u32 + 0xABCD;
        assert_eq!(&frame[8..12], &sum.to_le_bytes());
        assert_eq!(&frame[12..16], &[0x34, 0x12, 0xCD, 0xAB]);
        assert_eq!(frame[16], b'\r');
    }

    #[test]
    fn checksum_wraps_modulo_2_to_32() {
        let words = vec![0xFFFFu16; 0x1_0002];
        let sum = checksum(&words);
        let expected = (0xFFFFu64 * 0x1_0002) & 0xFFFF_FFFF;
        assert_eq!(sum as u64, expected);
    }

    #[test]
    fn header_round_trip() {
        let words = [1u16, 2, 3];
        let frame = encode_block(&words);
        let header = decode_header(&frame).unwrap();
        assert_eq!(header.word_count, 3);
        assert_eq!(header.checksum, 6);
        let payload = decode_payload(&header, &frame[HEADER_LEN..HEADER_LEN + 6]).unwrap();
        assert_eq!(payload, words);
    }

    #[test]
    fn truncated_header_rejected() {
        assert!(decode_header(&[0x5A, 0x55]).is_err());
    }

    #[test]
    fn bad_start_mark_rejected() {
        let mut frame = encode_block(&[1]);
        frame[0] = 0;
        let err = decode_header(&frame).unwrap_err();
        assert!(err.to_string().contains("bad start mark"));
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let frame = encode_block(&[7, 8]);
        let mut header = decode_header(&frame).unwrap();
        header.checksum ^= 1;
        assert!(decode_payload(&header, &frame[HEADER_LEN..HEADER_LEN + 4]).is_err());
    }

    #[test]
    fn f32_words_round_trip() {
        let values = [0.0f32, 1.5, 2.5, -0.25];
        let words = words_from_f32(&values);
        assert_eq!(words.len(), values.len() * 2);
        assert_eq!(f32_from_words(&words), values);
    }

    #[test]
    fn f64_words_round_trip() {
        let values = [0.125f64, -3.75, 1e9];
        let words = words_from_f64(&values);
        assert_eq!(words.len(), values.len() * 4);
        assert_eq!(f64_from_words(&words), values);
    }

    #[test]
    fn i32_words_round_trip() {
        let values = [0i32, -1, i32::MAX, i32::MIN];
        let words = words_from_i32(&values);
        assert_eq!(i32_from_words(&words), values);
    }

    #[test]
    fn odd_byte_payload_rejected() {
        assert!(words_from_i8(&[1, 2, 3]).is_err());
        assert_eq!(words_from_i8(&[1, 2]).unwrap(), vec![0x0201]);
    }

    #[test]
    fn image_words_pad_odd_tail() {
        assert_eq!(words_from_image(&[0xAB, 0xCD, 0xEF]), vec![0xCDAB, 0x00EF]);
    }
}
