//! Timestamp normalization and wraparound-corrected deltas.
//!
//! Three timestamp flavors feed the decoder:
//! - calendar timestamps (gateway `time`, network `received_at`):
//!   unbounded epoch seconds, no correction needed;
//! - the gateway concentrator counter: 32-bit microseconds, wraps at
//!   2^32-1 us (~4295 s) and is additionally reset by the gateway on a
//!   24-hour boundary;
//! - the device payload counter: bounded milliseconds, same rollover
//!   behavior.
//!
//! All channels are shifted back by the on-air duration so deltas
//! measure transmission start, not reception end.

/// Full period of the 32-bit microsecond counter, seconds.
pub const COUNTER_PERIOD_S: f64 = (u32::MAX as f64) / 1e6;

/// Residual delta left by the gateway's 24-hour counter reset:
/// (24h in us minus 20 counter periods) in seconds.
pub const DAILY_RESET_S: f64 = (86_400e6 - 20.0 * (u32::MAX as f64)) / 1e6;

/// Empirical guard band separating a plain wraparound from a 24-hour
/// reset. Deltas below -501 s are wraps; negative deltas above it are
/// resets. Calibrated against reference captures; do not tune.
pub const WRAP_GUARD_S: f64 = -501.0;

/// Convert a raw 32-bit microsecond counter to seconds.
pub fn counter_seconds(counter: u32) -> f64 {
    counter as f64 / 1e6
}

/// On-air compensation: timestamps are taken at end of reception, the
/// timing channel is defined on transmission start.
pub fn compensate(seconds: f64, airtime_s: f64) -> f64 {
    seconds - airtime_s
}

/// Correct a delta between two bounded-counter readings (seconds).
///
/// Non-negative deltas pass through. A delta below the guard band is
/// a counter wraparound; a negative delta above it is the 24-hour
/// reset. A delta of exactly -501 s is left uncorrected.
pub fn correct_counter_delta(delta_s: f64) -> f64 {
    if delta_s < WRAP_GUARD_S {
        delta_s + COUNTER_PERIOD_S
    } else if delta_s < 0.0 && delta_s > WRAP_GUARD_S {
        delta_s + DAILY_RESET_S
    } else {
        delta_s
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
