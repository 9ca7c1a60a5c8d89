//! Symbol extraction from inter-packet delays.
//!
//! A symbol is encoded as an extra delay of `i * phase_delta` seconds
//! on top of the nominal period. Extraction walks the 2^bits equally
//! spaced windows of half-width `tolerance` and returns the first one
//! the observed delta falls into.

/// Map a delta onto a symbol index in `[0, 2^bits)`.
///
/// Returns `None` when the delta is shorter than every window (there
/// is no negative symbol) or longer than the last one.
pub fn extract_symbol(
    delta_s: f64,
    nominal_s: f64,
    phase_delta_s: f64,
    tolerance_s: f64,
    bits: u8,
) -> Option<u16> {
    let mut d = (delta_s - nominal_s).abs() / phase_delta_s;
    let tol = tolerance_s / phase_delta_s;

    for i in 0..(1u32 << bits) {
        if d >= -tol && d <= tol {
            return Some(i as u16);
        } else if d < -tol {
            // Shorter than any remaining window: unrecoverable.
            return None;
        }
        d -= 1.0;
    }
    None
}

/// 1-bit threshold extraction: 0 inside the tolerance window around
/// nominal, 1 outside. Total, never unresolved.
pub fn extract_bit(delta_s: f64, nominal_s: f64, tolerance_s: f64) -> u8 {
    if delta_s < nominal_s - tolerance_s || delta_s > nominal_s + tolerance_s {
        1
    } else {
        0
    }
}

/// Differential (DPSK) combination of two consecutive raw bits.
pub fn combine_dpsk(prev_raw: u8, raw: u8) -> u8 {
    prev_raw ^ raw
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
