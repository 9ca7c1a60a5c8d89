//! Hamming(8,4) SEC-DED codec.
//!
//! Bit layout, LSB first: `p c0 c1 d0 c2 d1 d2 d3`
//! - `p`  (bit 0): overall parity over the other seven bits
//! - `c0` (bit 1), `c1` (bit 2), `c2` (bit 4): check bits
//! - `d0` (bit 3), `d1` (bit 5), `d2` (bit 6), `d3` (bit 7): data bits
//!
//! The syndrome directly addresses the erroneous bit position; the
//! overall parity bit separates single-bit (correctable) from
//! double-bit (uncorrectable) errors.

use crate::types::EccClass;

fn bit(value: u8, pos: u8) -> u8 {
    (value >> pos) & 1
}

/// Encode 4 data bits (low nibble) into an 8-bit codeword.
pub fn encode(data: u8) -> u8 {
    let d0 = bit(data, 0);
    let d1 = bit(data, 1);
    let d2 = bit(data, 2);
    let d3 = bit(data, 3);

    let c0 = d0 ^ d1 ^ d3;
    let c1 = d0 ^ d2 ^ d3;
    let c2 = d1 ^ d2 ^ d3;

    let without_parity =
        (c0 << 1) | (c1 << 2) | (d0 << 3) | (c2 << 4) | (d1 << 5) | (d2 << 6) | (d3 << 7);
    // Even overall parity.
    let p = (without_parity.count_ones() as u8) & 1;
    without_parity | p
}

/// Decode an 8-bit codeword into 4 data bits plus an error class.
///
/// Single-bit errors (including a flipped parity bit) are corrected;
/// double-bit errors are detected and yield no data.
pub fn decode(symbol: u8) -> (EccClass, Option<u8>) {
    let c0 = bit(symbol, 1);
    let c1 = bit(symbol, 2);
    let c2 = bit(symbol, 4);
    let d0 = bit(symbol, 3);
    let d1 = bit(symbol, 5);
    let d2 = bit(symbol, 6);
    let d3 = bit(symbol, 7);

    let s0 = c0 ^ d0 ^ d1 ^ d3;
    let s1 = c1 ^ d0 ^ d2 ^ d3;
    let s2 = c2 ^ d1 ^ d2 ^ d3;
    let syndrome = (s2 << 2) | (s1 << 1) | s0;

    let corrected = if syndrome != 0 {
        symbol ^ (1 << syndrome)
    } else {
        symbol
    };

    let data = (bit(corrected, 3))
        | (bit(corrected, 5) << 1)
        | (bit(corrected, 6) << 2)
        | (bit(corrected, 7) << 3);

    // Stored parity must match parity recomputed over the other seven
    // bits, i.e. the corrected codeword has even overall parity.
    let parity_ok = corrected.count_ones() % 2 == 0;

    if !parity_ok {
        if syndrome != 0 {
            // Syndrome pointed somewhere but parity still fails: two bits flipped.
            (EccClass::DoubleBit, None)
        } else {
            // Clean syndrome, bad parity: the parity bit itself flipped.
            (EccClass::SingleBit, Some(data))
        }
    } else if syndrome != 0 {
        (EccClass::SingleBit, Some(data))
    } else {
        (EccClass::NoError, Some(data))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
