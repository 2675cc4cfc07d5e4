//! Hamming and parity coding for teletext packets.
//!
//! Teletext protects its structural fields with Hamming 8/4 (one data nibble
//! per byte) and Hamming 24/18 (18 data bits per triplet), and its display
//! characters with odd parity. All lookup tables are built at compile time.
//!
//! Bytes handed to these functions must already be in transmission bit order
//! (bit 0 = first bit on the wire); see [`REVERSE`].

use crate::utils::errors::HammingError;

/// Bit-reversal table. PES carried teletext is delivered MSB first.
pub const REVERSE: [u8; 256] = reverse_table();

/// `1` where the byte has an odd number of set bits.
const PARITY: [u8; 256] = parity_table();

/// Decoded nibble per byte, or [`HAM84_ERROR`] for an uncorrectable byte.
const UNHAM84: [u8; 256] = unham84_table();

/// Marker stored for double-bit errors: value forced to `0x0F`, bit 7 flags it.
const HAM84_ERROR: u8 = 0x8F;

/// Bit to flip for each single-error syndrome (A, B, C failures).
const SYNDROME_BIT: [u8; 8] = [0, 0, 2, 7, 4, 5, 3, 1];

/// Per-byte contributions to the six Hamming 24/18 parity checks.
const HAM24_PARITY: [[u8; 256]; 3] = ham24_parity_table();

/// Correction mask per failed-check vector; [`HAM24_UNCORRECTABLE`] marks double errors.
const HAM24_CORRECTION: [u32; 64] = ham24_correction_table();

const HAM24_UNCORRECTABLE: u32 = 0x8000_0000;

const fn xor_fold(mut value: u8) -> u8 {
    value ^= value >> 4;
    value ^= value >> 2;
    value ^= value >> 1;
    value & 1
}

const fn reverse_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = (i as u8).reverse_bits();
        i += 1;
    }

    table
}

const fn parity_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = xor_fold(i as u8);
        i += 1;
    }

    table
}

const fn data_nibble(byte: u8) -> u8 {
    ((byte >> 1) & 0x1) | ((byte >> 2) & 0x2) | ((byte >> 3) & 0x4) | ((byte >> 4) & 0x8)
}

const fn unham84_entry(byte: u8) -> u8 {
    let a = xor_fold(byte & 0xA3) == 1;
    let b = xor_fold(byte & 0x8E) == 1;
    let c = xor_fold(byte & 0x3A) == 1;
    let d = xor_fold(byte) == 1;

    let syndrome = (!a as usize) | ((!b as usize) << 1) | ((!c as usize) << 2);

    if syndrome == 0 {
        // Clean, or only P4 flipped.
        data_nibble(byte)
    } else if d {
        HAM84_ERROR
    } else {
        data_nibble(byte ^ (1 << SYNDROME_BIT[syndrome]))
    }
}

const fn unham84_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = unham84_entry(i as u8);
        i += 1;
    }

    table
}

/// Checks covering a 1-based codeword position; bit 5 is the overall check.
const fn ham24_checks(position: usize) -> u8 {
    let mut checks = 0x20;
    if position <= 23 {
        checks |= (position & 0x1F) as u8;
    }

    checks
}

const fn ham24_parity_table() -> [[u8; 256]; 3] {
    let mut table = [[0u8; 256]; 3];
    let mut byte = 0;
    while byte < 3 {
        let mut value = 0;
        while value < 256 {
            let mut acc = 0u8;
            let mut bit = 0;
            while bit < 8 {
                if value & (1 << bit) != 0 {
                    acc ^= ham24_checks(byte * 8 + bit + 1);
                }
                bit += 1;
            }
            table[byte][value] = acc;
            value += 1;
        }
        byte += 1;
    }

    table
}

const fn ham24_data_mask(position: usize) -> u32 {
    match position {
        3 => 1 << 0,
        5 => 1 << 1,
        6 => 1 << 2,
        7 => 1 << 3,
        9..=15 => 1 << (position - 9 + 4),
        17..=23 => 1 << (position - 17 + 11),
        _ => 0,
    }
}

const fn ham24_correction_table() -> [u32; 64] {
    let mut table = [0u32; 64];
    let mut failed = 0;
    while failed < table.len() {
        let position = failed & 0x1F;
        let overall_failed = failed & 0x20 != 0;

        table[failed] = if position == 0 {
            0
        } else if !overall_failed || position > 23 {
            HAM24_UNCORRECTABLE
        } else {
            ham24_data_mask(position)
        };
        failed += 1;
    }

    table
}

/// Odd-parity bit required for the low seven bits of `byte`.
///
/// Returns `1` when those seven bits hold an even number of ones.
#[inline(always)]
pub const fn parity(byte: u8) -> u8 {
    PARITY[(byte & 0x7F) as usize] ^ 1
}

/// `true` when the full byte carries valid odd parity.
#[inline(always)]
pub const fn has_odd_parity(byte: u8) -> bool {
    PARITY[byte as usize] == 1
}

/// Validates odd parity over a whole buffer.
pub fn check_parity(buffer: &[u8]) -> bool {
    buffer.iter().all(|&byte| has_odd_parity(byte))
}

/// Validates odd parity over a buffer and masks bit 7 off every byte.
pub fn strip_parity(buffer: &mut [u8]) -> bool {
    let mut all_correct = true;
    for byte in buffer.iter_mut() {
        all_correct &= has_odd_parity(*byte);
        *byte &= 0x7F;
    }

    all_correct
}

/// Decodes one Hamming 8/4 protected byte into its data nibble.
#[inline(always)]
pub const fn unham84(byte: u8) -> Result<u8, HammingError> {
    let value = UNHAM84[byte as usize];
    if value == HAM84_ERROR {
        Err(HammingError::Uncorrectable84 { byte })
    } else {
        Ok(value)
    }
}

/// Decodes two Hamming 8/4 bytes, the first carrying the low nibble.
#[inline(always)]
pub const fn unham_two84_lsbf(bytes: [u8; 2]) -> Result<u8, HammingError> {
    let low = match unham84(bytes[0]) {
        Ok(v) => v,
        Err(e) => return Err(e),
    };
    let high = match unham84(bytes[1]) {
        Ok(v) => v,
        Err(e) => return Err(e),
    };

    Ok(low | (high << 4))
}

/// Decodes two Hamming 8/4 bytes, the first carrying the high nibble.
#[inline(always)]
pub const fn unham_two84_msbf(bytes: [u8; 2]) -> Result<u8, HammingError> {
    match unham_two84_lsbf([bytes[1], bytes[0]]) {
        Ok(v) => Ok(v),
        Err(e) => Err(e),
    }
}

/// Decodes a Hamming 24/18 triplet into its 18 data bits.
pub fn hamming24_18(bytes: [u8; 3]) -> Result<u32, HammingError> {
    let [b0, b1, b2] = bytes;

    let data = ((b0 >> 2) & 0x1) as u32
        | (((b0 >> 4) & 0x7) as u32) << 1
        | ((b1 & 0x7F) as u32) << 4
        | ((b2 & 0x7F) as u32) << 11;

    let failed = (HAM24_PARITY[0][b0 as usize]
        ^ HAM24_PARITY[1][b1 as usize]
        ^ HAM24_PARITY[2][b2 as usize])
        ^ 0x3F;

    match HAM24_CORRECTION[failed as usize] {
        HAM24_UNCORRECTABLE => Err(HammingError::Uncorrectable24_18),
        correction => Ok(data ^ correction),
    }
}

/// Encodes a nibble with Hamming 8/4.
pub const fn encode84(nibble: u8) -> u8 {
    let d1 = nibble & 1;
    let d2 = (nibble >> 1) & 1;
    let d3 = (nibble >> 2) & 1;
    let d4 = (nibble >> 3) & 1;

    let p1 = 1 ^ d1 ^ d3 ^ d4;
    let p2 = 1 ^ d1 ^ d2 ^ d4;
    let p3 = 1 ^ d1 ^ d2 ^ d3;
    let p4 = 1 ^ p1 ^ d1 ^ p2 ^ d2 ^ p3 ^ d3 ^ d4;

    p1 | (d1 << 1) | (p2 << 2) | (d2 << 3) | (p3 << 4) | (d3 << 5) | (p4 << 6) | (d4 << 7)
}

/// Encodes 18 data bits with Hamming 24/18.
pub fn encode24_18(data: u32) -> [u8; 3] {
    let mut word = 0u32;
    for position in 1..=23usize {
        let mask = ham24_data_mask(position);
        if mask != 0 && data & mask != 0 {
            word |= 1 << (position - 1);
        }
    }

    for check in 0..5 {
        let covered = (1..=23usize)
            .filter(|p| p & (1 << check) != 0)
            .fold(0u32, |acc, p| acc | (1 << (p - 1)));
        if (word & covered).count_ones() % 2 == 0 {
            word |= 1 << ((1 << check) - 1);
        }
    }

    if (word & 0x7F_FFFF).count_ones() % 2 == 0 {
        word |= 1 << 23;
    }

    [word as u8, (word >> 8) as u8, (word >> 16) as u8]
}

/// Sets bit 7 so that `byte` carries odd parity.
pub const fn with_parity(byte: u8) -> u8 {
    (byte & 0x7F) | (parity(byte) << 7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming84_round_trip() {
        for nibble in 0..16u8 {
            assert_eq!(unham84(encode84(nibble)).unwrap(), nibble);
        }
    }

    #[test]
    fn hamming84_corrects_single_errors() {
        for nibble in 0..16u8 {
            let code = encode84(nibble);
            for bit in 0..8 {
                assert_eq!(unham84(code ^ (1 << bit)).unwrap(), nibble);
            }
        }
    }

    #[test]
    fn hamming84_detects_double_errors() {
        for nibble in 0..16u8 {
            let code = encode84(nibble);
            for first in 0..8 {
                for second in (first + 1)..8 {
                    let damaged = code ^ (1 << first) ^ (1 << second);
                    assert!(matches!(
                        unham84(damaged),
                        Err(HammingError::Uncorrectable84 { .. })
                    ));
                }
            }
        }
    }

    #[test]
    fn nibble_pairs() {
        let pair = [encode84(0x5), encode84(0xA)];
        assert_eq!(unham_two84_lsbf(pair).unwrap(), 0xA5);
        assert_eq!(unham_two84_msbf(pair).unwrap(), 0x5A);
        assert!(unham_two84_lsbf([encode84(1), encode84(2) ^ 0x03]).is_err());
    }

    #[test]
    fn parity_bit_matches_low_seven_bits() {
        for byte in 0..=255u8 {
            let even = (byte & 0x7F).count_ones() % 2 == 0;
            assert_eq!(parity(byte) == 1, even);
            assert_eq!(has_odd_parity(byte), byte.count_ones() % 2 == 1);
        }
    }

    #[test]
    fn buffer_parity() {
        let mut line: Vec<u8> = b"HELLO WORLD".iter().map(|&b| with_parity(b)).collect();
        assert!(check_parity(&line));

        line[3] ^= 0x80;
        assert!(!check_parity(&line));
        assert!(!strip_parity(&mut line));
        assert_eq!(&line, b"HELLO WORLD");
    }

    #[test]
    fn hamming24_18_round_trip_and_correction() {
        for data in [0u32, 1, 0x2A5A5, 0x3FFFF, 0x00400, 0x15555] {
            let code = encode24_18(data);
            assert_eq!(hamming24_18(code).unwrap(), data);

            for bit in 0..24 {
                let mut damaged = code;
                damaged[bit / 8] ^= 1 << (bit % 8);
                assert_eq!(hamming24_18(damaged).unwrap(), data, "bit {bit}");
            }
        }
    }

    #[test]
    fn hamming24_18_detects_double_errors() {
        let code = encode24_18(0x1234);
        for (first, second) in [(0, 1), (2, 9), (5, 17), (12, 23), (8, 16)] {
            let mut damaged = code;
            damaged[first / 8] ^= 1 << (first % 8);
            damaged[second / 8] ^= 1 << (second % 8);
            assert!(matches!(
                hamming24_18(damaged),
                Err(HammingError::Uncorrectable24_18)
            ));
        }
    }

    #[test]
    fn reverse_is_an_involution() {
        for byte in 0..=255u8 {
            assert_eq!(REVERSE[REVERSE[byte as usize] as usize], byte);
        }
        assert_eq!(REVERSE[0x01], 0x80);
    }
}
