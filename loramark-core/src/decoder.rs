//! Message stream decoder.
//!
//! A single fold over an ordered capture: each record is classified
//! against the previous retained message (first / gap / adjacent),
//! timestamp deltas and the watermark are computed for adjacent pairs,
//! the active extraction mode recovers the timing symbol, and the
//! extracted symbol is verified against the reconstructed watermark.
//!
//! Pure and synchronous. No I/O, no logging; every per-message anomaly
//! (unresolved symbol, frame loss, missing gateway reading, double-bit
//! ECC error) lands in the output values and counters, never in an
//! `Err`. Only configuration misuse and out-of-order input abort.

use serde::Serialize;

use crate::config::{DecodeMode, DecodeParams, TimeSource};
use crate::hamming;
use crate::spreading;
use crate::symbol;
use crate::timebase;
use crate::types::*;
use crate::watermark;

/// Result of one decode run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeRun {
    pub messages: Vec<DecodedMessage>,
    pub summary: DecodeSummary,
}

/// The slice of the previous retained message the fold carries forward.
/// Kept explicit instead of re-reading the output list.
struct PrevFrame {
    frame_counter: u32,
    /// True for first/gap messages: they carry no symbol fields, so
    /// the next pair cannot be verified against them.
    tainted: bool,
    /// Compensated seconds of the driving timestamp channel.
    driving_s: f64,
    gateway_s: Option<f64>,
    modem_s: Option<f64>,
    network_s: f64,
    payload_millis: u32,
    payload_s: f64,
    /// Raw DPSK bit, when the previous message carried one.
    raw_bit: Option<u8>,
}

/// Decode a complete, ascending-ordered capture.
///
/// Records lacking the selected gateway reading are dropped without
/// touching loss accounting. Fails fast on invalid parameters and on
/// non-ascending frame counters.
pub fn decode_stream(params: &DecodeParams, records: &[UplinkRecord]) -> Result<DecodeRun> {
    params.validate()?;

    let window_ms = spreading::delay_window_ms(params.bits, params.phase_delta_s);

    let mut messages: Vec<DecodedMessage> = Vec::with_capacity(records.len());
    let mut summary = DecodeSummary::default();
    let mut prev: Option<PrevFrame> = None;

    for rec in records {
        // Data-quality gap: without the driving reading there is no
        // delta to extract from. Distinct from protocol-level loss.
        let Some(driving_s) = driving_seconds(params.source, rec) else {
            summary.skipped += 1;
            continue;
        };

        let gateway = rec.gateway_time.map(|t| TimeReading {
            raw: t,
            seconds: timebase::compensate(t, rec.airtime_s),
        });
        let modem = rec.gateway_counter.map(|c| {
            let raw = timebase::counter_seconds(c);
            TimeReading {
                raw,
                seconds: timebase::compensate(raw, rec.airtime_s),
            }
        });
        let network = TimeReading {
            raw: rec.network_time,
            seconds: timebase::compensate(rec.network_time, rec.airtime_s),
        };
        let payload = PayloadReading {
            millis: rec.payload_counter,
            seconds: f64::from(rec.payload_counter) / 1000.0,
        };
        let spreading_delay = match params.mode {
            DecodeMode::Spreading { seed } => Some(spreading::spreading_delay_s(
                seed,
                rec.frame_counter,
                window_ms,
            )),
            _ => None,
        };

        let state = match &prev {
            None => MessageState::First,
            Some(p) => {
                if rec.frame_counter <= p.frame_counter {
                    return Err(MarkError::OutOfOrder {
                        previous: p.frame_counter,
                        current: rec.frame_counter,
                    });
                }
                let lost = rec.frame_counter - p.frame_counter - 1;
                if lost > 0 {
                    summary.total_lost += u64::from(lost);
                    MessageState::Gap { lost }
                } else {
                    MessageState::Adjacent(decode_adjacent(
                        params,
                        window_ms,
                        p,
                        rec,
                        driving_s,
                        gateway.as_ref(),
                        modem.as_ref(),
                        &network,
                        &payload,
                        &mut summary,
                    ))
                }
            }
        };

        let raw_bit = match &state {
            MessageState::Adjacent(info) => match info.symbol {
                SymbolReading::Dpsk { raw, .. } => Some(raw),
                _ => None,
            },
            _ => None,
        };
        prev = Some(PrevFrame {
            frame_counter: rec.frame_counter,
            tainted: !matches!(state, MessageState::Adjacent(_)),
            driving_s,
            gateway_s: gateway.map(|g| g.seconds),
            modem_s: modem.map(|m| m.seconds),
            network_s: network.seconds,
            payload_millis: rec.payload_counter,
            payload_s: payload.seconds,
            raw_bit,
        });

        messages.push(DecodedMessage {
            frame_counter: rec.frame_counter,
            gateway,
            modem,
            network,
            payload,
            snr: rec.snr,
            rssi: rec.rssi,
            spreading_delay,
            state,
        });
    }

    summary.messages = messages.len();
    Ok(DecodeRun { messages, summary })
}

/// Compensated seconds of the channel that drives symbol extraction,
/// if the record carries it.
fn driving_seconds(source: TimeSource, rec: &UplinkRecord) -> Option<f64> {
    match source {
        TimeSource::GatewayTime => rec
            .gateway_time
            .map(|t| timebase::compensate(t, rec.airtime_s)),
        TimeSource::GatewayCounter => rec
            .gateway_counter
            .map(|c| timebase::compensate(timebase::counter_seconds(c), rec.airtime_s)),
    }
}

/// Delta, watermark, and symbol computation for a contiguous pair.
#[allow(clippy::too_many_arguments)]
fn decode_adjacent(
    params: &DecodeParams,
    window_ms: f64,
    prev: &PrevFrame,
    rec: &UplinkRecord,
    driving_s: f64,
    gateway: Option<&TimeReading>,
    modem: Option<&TimeReading>,
    network: &TimeReading,
    payload: &PayloadReading,
    summary: &mut DecodeSummary,
) -> AdjacentInfo {
    let gateway_delta = match (gateway, prev.gateway_s) {
        (Some(g), Some(p)) => Some(g.seconds - p),
        _ => None,
    };
    let modem_delta = match (modem, prev.modem_s) {
        (Some(m), Some(p)) => Some(timebase::correct_counter_delta(m.seconds - p)),
        _ => None,
    };
    let network_delta = network.seconds - prev.network_s;
    let payload_delta = timebase::correct_counter_delta(payload.seconds - prev.payload_s);

    let raw_delta = driving_s - prev.driving_s;
    let driving_delta = match params.source {
        TimeSource::GatewayTime => raw_delta,
        TimeSource::GatewayCounter => timebase::correct_counter_delta(raw_delta),
    };

    let wm = watermark::watermark(
        prev.payload_millis,
        rec.payload_counter,
        params.watermark_key,
        params.watermark_shift,
    );
    let effective_watermark = watermark::effective(wm, params.bits);

    let reading = match params.mode {
        DecodeMode::Plain => SymbolReading::Plain {
            symbol: symbol::extract_symbol(
                driving_delta,
                params.nominal_s,
                params.phase_delta_s,
                params.tolerance_s,
                params.bits,
            ),
        },
        DecodeMode::Dpsk => {
            let raw = symbol::extract_bit(driving_delta, params.nominal_s, params.tolerance_s);
            SymbolReading::Dpsk {
                raw,
                combined: prev.raw_bit.map(|p| symbol::combine_dpsk(p, raw)),
            }
        }
        DecodeMode::Spreading { seed } => {
            // Recomputed from seed for both endpoints; see spreading.rs.
            let delay = spreading::spreading_delay_s(seed, rec.frame_counter, window_ms);
            let prev_delay = spreading::spreading_delay_s(seed, prev.frame_counter, window_ms);
            let despread_delta = spreading::despread(driving_delta, prev_delay, delay);
            SymbolReading::Spreading {
                symbol: symbol::extract_symbol(
                    despread_delta,
                    params.nominal_s,
                    params.phase_delta_s,
                    params.tolerance_s,
                    params.bits,
                ),
                despread_delta,
            }
        }
        DecodeMode::Ecc => {
            // The code operates on twice the payload width: 4 data
            // bits protected by 4 redundancy bits.
            match symbol::extract_symbol(
                driving_delta,
                params.nominal_s,
                params.phase_delta_s,
                params.tolerance_s,
                params.bits * 2,
            ) {
                Some(sym) => {
                    let (errors, data) = hamming::decode(sym as u8);
                    SymbolReading::Ecc {
                        errors: Some(errors),
                        data,
                    }
                }
                None => SymbolReading::Ecc {
                    errors: None,
                    data: None,
                },
            }
        }
    };

    if let SymbolReading::Ecc {
        errors: Some(errors),
        ..
    } = reading
    {
        match errors {
            EccClass::NoError => summary.ecc.none += 1,
            EccClass::SingleBit => summary.ecc.single += 1,
            EccClass::DoubleBit => summary.ecc.double += 1,
        }
    }

    // A slot is verifiable only when the predecessor itself carried
    // symbol fields. DPSK additionally needs two consecutive raw bits.
    let symbol_correct = if prev.tainted {
        None
    } else if matches!(reading, SymbolReading::Dpsk { combined: None, .. }) {
        None
    } else {
        summary.symbols_possible += 1;
        let correct = reading.effective() == Some(effective_watermark);
        if !correct {
            summary.symbol_errors += 1;
        }
        Some(correct)
    };

    AdjacentInfo {
        gateway_delta,
        modem_delta,
        network_delta,
        payload_delta,
        watermark: wm,
        effective_watermark,
        symbol: reading,
        symbol_correct,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
