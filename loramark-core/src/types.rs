//! Shared types, error enum, and decoded message types for loramark-core.

use serde::Serialize;
use thiserror::Error;

/// All errors produced by loramark-core.
#[derive(Debug, Error)]
pub enum MarkError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("records out of order: frame {current} after frame {previous}")]
    OutOfOrder { previous: u32, current: u32 },
    #[error("profile error: {0}")]
    Profile(String),
}

pub type Result<T> = std::result::Result<T, MarkError>;

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// One captured uplink transmission, as extracted from the network
/// provider's envelope by the caller. Read-only to the decoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UplinkRecord {
    /// LoRaWAN frame counter (`f_cnt`). Strictly ascending across a capture.
    pub frame_counter: u32,
    /// On-air transmission duration in seconds (`consumed_airtime`).
    pub airtime_s: f64,
    /// Gateway calendar arrival timestamp, epoch seconds.
    pub gateway_time: Option<f64>,
    /// Gateway concentrator timestamp: raw 32-bit microsecond counter.
    pub gateway_counter: Option<u32>,
    /// Network-server arrival timestamp (`received_at`), epoch seconds.
    pub network_time: f64,
    /// Device payload counter in milliseconds, byte-order already corrected.
    pub payload_counter: u32,
    /// Signal-to-noise ratio at the selected gateway, dB.
    pub snr: Option<f64>,
    /// Received signal strength at the selected gateway, dBm.
    pub rssi: Option<f64>,
}

// ---------------------------------------------------------------------------
// Timestamp channels
// ---------------------------------------------------------------------------

/// A single timestamp channel reading: raw value and the
/// on-air-compensated seconds value actually used for deltas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeReading {
    /// Uncompensated value in seconds (counter channels: counter / 1e6).
    pub raw: f64,
    /// Airtime-compensated seconds (transmission start time).
    pub seconds: f64,
}

/// Device payload counter reduced to a time value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PayloadReading {
    /// Raw counter value, milliseconds.
    pub millis: u32,
    /// Counter value as seconds.
    pub seconds: f64,
}

// ---------------------------------------------------------------------------
// Decoded messages
// ---------------------------------------------------------------------------

/// One decoded message per retained uplink record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub frame_counter: u32,
    /// Gateway calendar channel, if the record carried one.
    pub gateway: Option<TimeReading>,
    /// Gateway concentrator (microsecond counter) channel.
    pub modem: Option<TimeReading>,
    /// Network-server channel. Always present.
    pub network: TimeReading,
    /// Device payload channel. Always present.
    pub payload: PayloadReading,
    pub snr: Option<f64>,
    pub rssi: Option<f64>,
    /// Pseudo-random spreading delay for this frame, seconds.
    /// Present for every message when decoding in spreading mode.
    pub spreading_delay: Option<f64>,
    pub state: MessageState,
}

/// Per-message decode state. Delta, watermark, and symbol fields exist
/// only in the `Adjacent` variant: they are defined if and only if
/// exactly one frame boundary separates a message from its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state")]
pub enum MessageState {
    /// Stream seed. Treated as preceded by a lost frame: no symbol
    /// can exist, and the next message cannot be verified against it.
    First,
    /// `lost` frames are missing directly before this message.
    Gap { lost: u32 },
    /// Contiguous with the previous retained message.
    Adjacent(AdjacentInfo),
}

impl MessageState {
    /// Frames lost immediately before this message. The first message
    /// of a run counts as preceded by one loss.
    pub fn lost_before(&self) -> u32 {
        match self {
            MessageState::First => 1,
            MessageState::Gap { lost } => *lost,
            MessageState::Adjacent(_) => 0,
        }
    }
}

/// Fields computable only for a message adjacent to its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjacentInfo {
    /// Gateway calendar delta, seconds. `None` if either endpoint
    /// lacked the calendar reading.
    pub gateway_delta: Option<f64>,
    /// Gateway counter delta, seconds, wraparound-corrected.
    pub modem_delta: Option<f64>,
    /// Network-server delta, seconds.
    pub network_delta: f64,
    /// Payload counter delta, seconds, wraparound-corrected.
    pub payload_delta: f64,
    /// Full-width watermark reconstructed from consecutive payload counters.
    pub watermark: u32,
    /// Watermark masked to the configured symbol bit-width.
    pub effective_watermark: u16,
    /// Timing-channel extraction result for the active mode.
    pub symbol: SymbolReading,
    /// Whether the effective symbol matched the effective watermark.
    /// `None` when the predecessor carried no symbol fields (first
    /// message or gap) and the slot is therefore unverifiable.
    pub symbol_correct: Option<bool>,
}

/// Symbol extraction outcome. One variant per decode mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode")]
pub enum SymbolReading {
    /// n-bit window search on the raw delta.
    Plain { symbol: Option<u16> },
    /// 1-bit threshold; `combined` is the differential symbol
    /// `prev_raw XOR raw`, undefined without a previous raw bit.
    Dpsk { raw: u8, combined: Option<u8> },
    /// Window search on the de-spread delta.
    Spreading {
        symbol: Option<u16>,
        despread_delta: f64,
    },
    /// Hamming(8,4)-protected extraction at twice the payload width.
    Ecc {
        errors: Option<EccClass>,
        data: Option<u8>,
    },
}

impl SymbolReading {
    /// The effective symbol value compared against the effective watermark.
    pub fn effective(&self) -> Option<u16> {
        match self {
            SymbolReading::Plain { symbol } => *symbol,
            SymbolReading::Dpsk { combined, .. } => combined.map(u16::from),
            SymbolReading::Spreading { symbol, .. } => *symbol,
            SymbolReading::Ecc { data, .. } => data.map(u16::from),
        }
    }
}

/// Hamming(8,4) error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EccClass {
    /// Codeword was clean.
    NoError,
    /// Single-bit error, corrected.
    SingleBit,
    /// Double-bit error, uncorrectable.
    DoubleBit,
}

// ---------------------------------------------------------------------------
// Run statistics
// ---------------------------------------------------------------------------

/// Hamming decode outcome tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EccCounts {
    pub none: u64,
    pub single: u64,
    pub double: u64,
}

/// Aggregate statistics for one decode run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DecodeSummary {
    /// Messages retained in the output.
    pub messages: usize,
    /// Records dropped for lacking the selected gateway reading.
    pub skipped: usize,
    /// Total frames lost across all gaps.
    pub total_lost: u64,
    /// Verifiable symbol slots (contiguous pairs with a clean predecessor).
    pub symbols_possible: u64,
    /// Slots whose effective symbol did not match the effective watermark.
    pub symbol_errors: u64,
    pub ecc: EccCounts,
}

impl DecodeSummary {
    /// Packet loss as a percentage of retained messages.
    pub fn loss_rate(&self) -> f64 {
        if self.messages == 0 {
            return 0.0;
        }
        self.total_lost as f64 / self.messages as f64 * 100.0
    }

    /// Symbol error rate as a percentage of verifiable slots.
    pub fn symbol_error_rate(&self) -> f64 {
        if self.symbols_possible == 0 {
            return 0.0;
        }
        self.symbol_errors as f64 / self.symbols_possible as f64 * 100.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
