//! The Things Network uplink envelope extraction.
//!
//! Captures come as a JSON array of `{"result": ...}` envelopes, one
//! per uplink. This module pulls out exactly what the decoder needs:
//! frame counter, on-air duration, the selected gateway's calendar
//! timestamp and concentrator counter, the network-server timestamp,
//! the device payload counter, and SNR/RSSI where reported.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use thiserror::Error;

use loramark_core::UplinkRecord;

#[derive(Debug, Error)]
pub enum TtnError {
    #[error("capture parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame {frame}: {reason}")]
    Field { frame: u32, reason: String },
}

// ---------------------------------------------------------------------------
// Envelope schema (only the fields we read)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub result: UplinkResult,
}

#[derive(Debug, Deserialize)]
pub struct UplinkResult {
    pub received_at: String,
    pub uplink_message: UplinkMessage,
}

#[derive(Debug, Deserialize)]
pub struct UplinkMessage {
    #[serde(default)]
    pub f_cnt: u32,
    pub frm_payload: String,
    pub consumed_airtime: String,
    #[serde(default)]
    pub rx_metadata: Vec<RxMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct RxMetadata {
    pub gateway_ids: GatewayIds,
    /// Calendar arrival timestamp, RFC 3339.
    pub time: Option<String>,
    /// Concentrator microsecond counter.
    pub timestamp: Option<u32>,
    pub rssi: Option<f64>,
    pub snr: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct GatewayIds {
    pub eui: Option<String>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Parse a capture file (JSON array of envelopes).
pub fn parse_capture(text: &str) -> Result<Vec<Envelope>, TtnError> {
    Ok(serde_json::from_str(text)?)
}

/// Reduce one envelope to an `UplinkRecord`, reading gateway metadata
/// from the gateway with the given EUI. A missing gateway entry leaves
/// the gateway fields empty; the decoder decides whether that makes
/// the record unusable.
pub fn to_record(envelope: &Envelope, gateway_eui: &str) -> Result<UplinkRecord, TtnError> {
    let msg = &envelope.result.uplink_message;
    let frame = msg.f_cnt;

    let field_err = |reason: String| TtnError::Field {
        frame,
        reason,
    };

    let airtime_s = parse_airtime(&msg.consumed_airtime)
        .ok_or_else(|| field_err(format!("bad consumed_airtime: {}", msg.consumed_airtime)))?;

    let network_time = parse_timestamp(&envelope.result.received_at)
        .ok_or_else(|| field_err(format!("bad received_at: {}", envelope.result.received_at)))?;

    let payload_counter = payload_counter(&msg.frm_payload)
        .ok_or_else(|| field_err(format!("bad frm_payload: {}", msg.frm_payload)))?;

    let mut gateway_time = None;
    let mut gateway_counter = None;
    let mut snr = None;
    let mut rssi = None;
    for gw in &msg.rx_metadata {
        if gw.gateway_ids.eui.as_deref() == Some(gateway_eui) {
            gateway_time = match &gw.time {
                Some(t) => Some(
                    parse_timestamp(t)
                        .ok_or_else(|| field_err(format!("bad gateway time: {t}")))?,
                ),
                None => None,
            };
            gateway_counter = gw.timestamp;
            snr = gw.snr;
            rssi = gw.rssi;
        }
    }

    Ok(UplinkRecord {
        frame_counter: frame,
        airtime_s,
        gateway_time,
        gateway_counter,
        network_time,
        payload_counter,
        snr,
        rssi,
    })
}

/// Reduce a whole capture. Fails on the first malformed envelope.
pub fn extract_records(
    envelopes: &[Envelope],
    gateway_eui: &str,
) -> Result<Vec<UplinkRecord>, TtnError> {
    envelopes
        .iter()
        .map(|e| to_record(e, gateway_eui))
        .collect()
}

/// Parse TTN's `consumed_airtime` ("1.318912s") into seconds.
fn parse_airtime(s: &str) -> Option<f64> {
    s.strip_suffix('s')?.parse().ok()
}

/// Parse an RFC 3339 timestamp into epoch seconds.
fn parse_timestamp(s: &str) -> Option<f64> {
    let dt = chrono::DateTime::parse_from_rfc3339(s).ok()?;
    Some(dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9)
}

/// Decode the device payload counter from the base64 `frm_payload`.
///
/// The device sends a little-endian 64-bit value whose high 32 bits
/// are the millisecond counter.
fn payload_counter(b64: &str) -> Option<u32> {
    let bytes = BASE64.decode(b64).ok()?;
    let first: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
    Some((u64::from_le_bytes(first) >> 32) as u32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const GW_EUI: &str = "58A0CBFFFE802A21";

    fn sample_envelope() -> String {
        // 0x12345678 ms counter in the high half of a little-endian u64.
        let payload = BASE64.encode(0x12345678u64.wrapping_shl(32).to_le_bytes());
        format!(
            r#"{{
  "result": {{
    "received_at": "2022-06-23T20:54:01.625Z",
    "uplink_message": {{
      "f_cnt": 42,
      "frm_payload": "{payload}",
      "consumed_airtime": "1.318912s",
      "rx_metadata": [
        {{
          "gateway_ids": {{ "eui": "AC1F09FFFE004F1F" }},
          "time": "2022-06-23T20:54:01.100Z",
          "timestamp": 1000,
          "rssi": -120.0,
          "snr": -2.5
        }},
        {{
          "gateway_ids": {{ "eui": "{GW_EUI}" }},
          "time": "2022-06-23T20:54:01.621829032Z",
          "timestamp": 4132161076,
          "rssi": -97.0,
          "snr": 8.25
        }}
      ]
    }}
  }}
}}"#
        )
    }

    #[test]
    fn test_payload_counter_high_half() {
        let b64 = BASE64.encode(0xAABBCCDDu64.wrapping_shl(32).to_le_bytes());
        assert_eq!(payload_counter(&b64), Some(0xAABBCCDD));
    }

    #[test]
    fn test_payload_counter_low_half_ignored() {
        let value = (0x0102_0304u64 << 32) | 0xFFFF_FFFF;
        let b64 = BASE64.encode(value.to_le_bytes());
        assert_eq!(payload_counter(&b64), Some(0x0102_0304));
    }

    #[test]
    fn test_payload_counter_short_payload() {
        let b64 = BASE64.encode([1u8, 2, 3, 4]);
        assert_eq!(payload_counter(&b64), None);
    }

    #[test]
    fn test_parse_airtime() {
        assert_eq!(parse_airtime("1.318912s"), Some(1.318912));
        assert_eq!(parse_airtime("0.061696s"), Some(0.061696));
        assert_eq!(parse_airtime("1.3"), None);
        assert_eq!(parse_airtime("abc s"), None);
    }

    #[test]
    fn test_parse_timestamp_epoch() {
        let t = parse_timestamp("1970-01-01T00:05:00.5Z").unwrap();
        assert!((t - 300.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_timestamp_nanosecond_fraction() {
        // TTN reports up to nanosecond fractions.
        let t = parse_timestamp("2022-06-23T20:54:01.621829032Z").unwrap();
        let base = parse_timestamp("2022-06-23T20:54:01Z").unwrap();
        assert!((t - base - 0.621829032).abs() < 1e-9);
    }

    #[test]
    fn test_to_record_selects_gateway() {
        let envelopes = parse_capture(&format!("[{}]", sample_envelope())).unwrap();
        let rec = to_record(&envelopes[0], GW_EUI).unwrap();
        assert_eq!(rec.frame_counter, 42);
        assert_eq!(rec.airtime_s, 1.318912);
        assert_eq!(rec.gateway_counter, Some(4132161076));
        assert_eq!(rec.snr, Some(8.25));
        assert_eq!(rec.rssi, Some(-97.0));
        assert_eq!(rec.payload_counter, 0x12345678);
        // Calendar fields parsed, not the other gateway's.
        let gw = rec.gateway_time.unwrap();
        let other = parse_timestamp("2022-06-23T20:54:01.100Z").unwrap();
        assert!(gw > other);
    }

    #[test]
    fn test_to_record_unknown_gateway_leaves_fields_empty() {
        let envelopes = parse_capture(&format!("[{}]", sample_envelope())).unwrap();
        let rec = to_record(&envelopes[0], "0000000000000000").unwrap();
        assert_eq!(rec.gateway_time, None);
        assert_eq!(rec.gateway_counter, None);
        assert_eq!(rec.snr, None);
        // Network-side fields are unaffected.
        assert_eq!(rec.frame_counter, 42);
    }

    #[test]
    fn test_to_record_bad_airtime() {
        let text = sample_envelope().replace("1.318912s", "forever");
        let envelopes = parse_capture(&format!("[{text}]")).unwrap();
        assert!(matches!(
            to_record(&envelopes[0], GW_EUI),
            Err(TtnError::Field { frame: 42, .. })
        ));
    }
}
