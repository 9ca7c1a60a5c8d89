//! Pseudo-random spreading-delay generator.
//!
//! The device adds a per-frame pseudo-random delay to decorrelate its
//! transmissions from a fixed schedule. The sequence comes from a
//! 16-bit xorshift LFSR clocked once per frame. The receiver
//! recomputes the LFSR from the shared seed and the frame counter on
//! every call instead of stepping it incrementally: lost frames would
//! silently desynchronize incremental state, while recomputation costs
//! O(frame_counter) and is always right. Keep it that way.

/// One xorshift step over 16 bits.
pub fn xorshift16(mut lfsr: u16) -> u16 {
    lfsr ^= lfsr << 7;
    lfsr ^= lfsr >> 9;
    lfsr ^= lfsr << 8;
    lfsr
}

/// Delay window in milliseconds for the configured symbol alphabet.
/// Matches the device firmware: one full alphabet span of phase steps.
pub fn delay_window_ms(bits: u8, phase_delta_s: f64) -> f64 {
    f64::from(1u32 << bits) * phase_delta_s * 1000.0
}

/// Spreading delay for one frame, seconds.
///
/// Clocks the LFSR `frame_counter` times from `seed`, then maps the
/// 16-bit value linearly into `[window, 3 * window]` milliseconds.
pub fn spreading_delay_s(seed: u16, frame_counter: u32, delay_window_ms: f64) -> f64 {
    let mut lfsr = seed;
    for _ in 0..frame_counter {
        lfsr = xorshift16(lfsr);
    }
    let delay_ms = delay_window_ms + (f64::from(lfsr) * 2.0 * delay_window_ms) / 65536.0;
    delay_ms / 1000.0
}

/// Remove the spreading delays from a raw inter-packet delta.
pub fn despread(delta_s: f64, prev_delay_s: f64, delay_s: f64) -> f64 {
    delta_s - delay_s + prev_delay_s
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xorshift_nonzero_stays_nonzero() {
        let mut lfsr = 1u16;
        for _ in 0..1000 {
            lfsr = xorshift16(lfsr);
            assert_ne!(lfsr, 0);
        }
    }

    #[test]
    fn test_xorshift_zero_fixed_point() {
        assert_eq!(xorshift16(0), 0);
    }

    #[test]
    fn test_xorshift_full_period() {
        // The 7/9/8 xorshift triple permutes all 65535 nonzero states.
        let seed = 0xACE1u16;
        let mut lfsr = seed;
        let mut period = 0u32;
        loop {
            lfsr = xorshift16(lfsr);
            period += 1;
            if lfsr == seed {
                break;
            }
        }
        assert_eq!(period, 65535);
    }

    #[test]
    fn test_delay_window() {
        assert_eq!(delay_window_ms(1, 0.040), 80.0);
        assert_eq!(delay_window_ms(4, 0.050), 800.0);
    }

    #[test]
    fn test_spreading_delay_deterministic() {
        let window = delay_window_ms(4, 0.050);
        let a = spreading_delay_s(0xBEEF, 5, window);
        let b = spreading_delay_s(0xBEEF, 5, window);
        assert_eq!(a, b);
        // Independent of any other frame's computation.
        let _ = spreading_delay_s(0xBEEF, 4, window);
        assert_eq!(spreading_delay_s(0xBEEF, 5, window), a);
    }

    #[test]
    fn test_spreading_delay_range() {
        let window = delay_window_ms(4, 0.050);
        for frame in 0..200u32 {
            let delay_s = spreading_delay_s(0xBEEF, frame, window);
            let delay_ms = delay_s * 1000.0;
            assert!(delay_ms >= window, "frame {frame}: {delay_ms} below window");
            assert!(
                delay_ms < 3.0 * window,
                "frame {frame}: {delay_ms} past 3x window"
            );
        }
    }

    #[test]
    fn test_spreading_delay_frame_zero_is_seed() {
        let window = 100.0;
        // frame 0 applies no LFSR steps: delay comes straight from the seed.
        let expected_ms = window + (f64::from(0x1234u16) * 2.0 * window) / 65536.0;
        assert!((spreading_delay_s(0x1234, 0, window) - expected_ms / 1000.0).abs() < 1e-12);
    }

    #[test]
    fn test_despread() {
        let raw = 300.250;
        let corrected = despread(raw, 0.100, 0.150);
        assert!((corrected - 300.200).abs() < 1e-12);
    }
}
