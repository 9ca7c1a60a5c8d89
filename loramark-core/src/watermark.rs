//! Receiver-side watermark reconstruction.
//!
//! The device derives a pseudo-random watermark from two consecutive
//! payload counter values and encodes it into its transmit timing.
//! Only the counters' high bits enter the XOR, so the value is stable
//! against small counter jitter but changes between transmissions.
//! The reconstruction here is the reference the timing-extracted
//! symbol is verified against.

/// Default XOR key shared with the device.
pub const DEFAULT_KEY: u32 = 0xA5A5;

/// Default right-shift discarding counter jitter bits.
pub const DEFAULT_SHIFT: u32 = 13;

/// Reconstruct the full-width watermark from two consecutive payload
/// counters. Pure and order-sensitive: swapping the counters changes
/// the result whenever their shifted values differ.
pub fn watermark(prev_counter: u32, counter: u32, key: u32, shift: u32) -> u32 {
    (prev_counter >> shift) ^ (counter >> shift) ^ key
}

/// Mask a watermark down to the configured symbol bit-width.
pub fn effective(watermark: u32, bits: u8) -> u16 {
    (watermark & ((1u32 << bits) - 1)) as u16
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_definition() {
        let a = 0x12345678;
        let b = 0x1234A9BC;
        assert_eq!(
            watermark(a, b, DEFAULT_KEY, DEFAULT_SHIFT),
            (a >> 13) ^ (b >> 13) ^ 0xA5A5
        );
    }

    #[test]
    fn test_watermark_identical_counters_cancel() {
        let a = 0x0012_2000;
        assert_eq!(watermark(a, a, DEFAULT_KEY, 13), DEFAULT_KEY);
    }

    #[test]
    fn test_watermark_shift_discards_low_bits() {
        // Counters differing only below the shift produce the same watermark.
        let a = 0x0040_0000;
        let b = a | 0x1FFF;
        assert_eq!(
            watermark(a, b, DEFAULT_KEY, 13),
            watermark(a, a, DEFAULT_KEY, 13)
        );
    }

    #[test]
    fn test_watermark_zero_shift() {
        assert_eq!(watermark(0xFF00, 0x00FF, 0, 0), 0xFFFF);
    }

    #[test]
    fn test_effective_masks_to_width() {
        assert_eq!(effective(0xA5A5, 1), 0x1);
        assert_eq!(effective(0xA5A5, 4), 0x5);
        assert_eq!(effective(0xA5A5, 8), 0xA5);
    }

    #[test]
    fn test_effective_idempotent() {
        for bits in 1..=8u8 {
            let once = effective(0xDEAD_BEEF, bits);
            assert_eq!(effective(u32::from(once), bits), once);
        }
    }
}
