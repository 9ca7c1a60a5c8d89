//! Decode parameters and experiment profiles.
//!
//! A profile captures everything one measurement campaign fixes up
//! front: channel geometry (nominal delay, tolerance, quantization
//! step, bit-width), watermark key material, the decode mode, and
//! which gateway/timestamp field drives symbol extraction.

use crate::types::{MarkError, Result};
use crate::watermark;

/// Symbol extraction mode. Exactly one is active per run; combining
/// spreading with ECC is unrepresentable by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Plain n-bit quantization of the raw delta.
    Plain,
    /// 1-bit differential decoding across consecutive messages.
    Dpsk,
    /// De-spread the pseudo-random per-frame delay before extraction.
    Spreading { seed: u16 },
    /// Hamming(8,4)-protected extraction.
    Ecc,
}

/// Which timestamp representation drives symbol extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// Gateway calendar timestamp (`time` field).
    GatewayTime,
    /// Gateway concentrator microsecond counter (`timestamp` field).
    GatewayCounter,
}

/// Pure decode parameters consumed by the stream decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    /// Nominal inter-packet delay, seconds.
    pub nominal_s: f64,
    /// Half-width of each quantization window, seconds.
    pub tolerance_s: f64,
    /// Step between adjacent symbol windows, seconds.
    pub phase_delta_s: f64,
    /// Symbol bit-width.
    pub bits: u8,
    /// Right-shift applied to payload counters before XOR.
    pub watermark_shift: u32,
    /// XOR key folded into the watermark.
    pub watermark_key: u32,
    pub mode: DecodeMode,
    pub source: TimeSource,
}

impl Default for DecodeParams {
    fn default() -> Self {
        DecodeParams {
            nominal_s: 300.0,
            tolerance_s: 0.020,
            phase_delta_s: 0.040,
            bits: 1,
            watermark_shift: watermark::DEFAULT_SHIFT,
            watermark_key: watermark::DEFAULT_KEY,
            mode: DecodeMode::Plain,
            source: TimeSource::GatewayTime,
        }
    }
}

impl DecodeParams {
    /// Reject caller programming errors before any message is processed.
    pub fn validate(&self) -> Result<()> {
        if self.bits == 0 || self.bits > 8 {
            return Err(MarkError::InvalidConfiguration(format!(
                "symbol bit-width must be 1-8, got {}",
                self.bits
            )));
        }
        if self.watermark_shift >= 32 {
            return Err(MarkError::InvalidConfiguration(format!(
                "watermark shift must be below 32, got {}",
                self.watermark_shift
            )));
        }
        if self.mode == DecodeMode::Dpsk && self.bits != 1 {
            return Err(MarkError::InvalidConfiguration(format!(
                "dpsk mode is 1-bit, got bits = {}",
                self.bits
            )));
        }
        if self.mode == DecodeMode::Ecc && self.bits != 4 {
            return Err(MarkError::InvalidConfiguration(format!(
                "ecc mode protects 4 data bits with Hamming(8,4), got bits = {}",
                self.bits
            )));
        }
        if !(self.phase_delta_s > 0.0) {
            return Err(MarkError::InvalidConfiguration(format!(
                "phase delta must be positive, got {}",
                self.phase_delta_s
            )));
        }
        if !(self.tolerance_s > 0.0) {
            return Err(MarkError::InvalidConfiguration(format!(
                "tolerance must be positive, got {}",
                self.tolerance_s
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Experiment profiles
// ---------------------------------------------------------------------------

/// A parsed experiment profile: decode parameters plus the gateway
/// the capture should be read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub params: DecodeParams,
    /// EUI of the gateway whose rx metadata is authoritative.
    pub gateway_eui: String,
}

/// Parse a YAML-like profile text.
///
/// ```yaml
/// channel:
///   nominal: 300.0
///   tolerance: 0.020
///   phase_delta: 0.040
///   bits: 1
///
/// watermark:
///   shift: 13
///   key: 0xa5a5
///
/// mode: dpsk
/// spreading_seed: 0xbeef
///
/// gateway:
///   eui: "58A0CBFFFE802A21"
///   source: time
/// ```
pub fn parse_profile(text: &str) -> Result<Profile> {
    let mut params = DecodeParams::default();
    let mut gateway_eui: Option<String> = None;
    let mut mode_name: Option<String> = None;
    let mut spreading_seed: Option<u16> = None;
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = strip_comment(val.trim());

        if !is_indented {
            if val.is_empty() {
                current_section = Some(key.to_string());
                continue;
            }
            current_section = None;
            match key {
                "mode" => mode_name = parse_string_value(val),
                "spreading_seed" => {
                    let seed = parse_int_value(val)
                        .filter(|&s| s <= u32::from(u16::MAX))
                        .ok_or_else(|| {
                            MarkError::Profile(format!("bad spreading_seed: {val}"))
                        })?;
                    spreading_seed = Some(seed as u16)
                }
                _ => {}
            }
        } else if let Some(ref section) = current_section {
            match section.as_str() {
                "channel" => match key {
                    "nominal" => params.nominal_s = parse_float(key, val)?,
                    "tolerance" => params.tolerance_s = parse_float(key, val)?,
                    "phase_delta" => params.phase_delta_s = parse_float(key, val)?,
                    "bits" => {
                        params.bits = parse_int_value(val)
                            .filter(|&b| b <= u32::from(u8::MAX))
                            .ok_or_else(|| MarkError::Profile(format!("bad bits: {val}")))?
                            as u8
                    }
                    _ => {}
                },
                "watermark" => match key {
                    "shift" => {
                        params.watermark_shift = parse_int_value(val)
                            .ok_or_else(|| MarkError::Profile(format!("bad shift: {val}")))?
                    }
                    "key" => {
                        params.watermark_key = parse_int_value(val)
                            .ok_or_else(|| MarkError::Profile(format!("bad key: {val}")))?
                    }
                    _ => {}
                },
                "gateway" => match key {
                    "eui" => gateway_eui = parse_string_value(val),
                    "source" => {
                        params.source = match parse_string_value(val).as_deref() {
                            Some("time") => TimeSource::GatewayTime,
                            Some("counter") => TimeSource::GatewayCounter,
                            other => {
                                return Err(MarkError::Profile(format!(
                                    "gateway source must be time or counter, got {other:?}"
                                )))
                            }
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }
    }

    params.mode = match mode_name.as_deref() {
        None | Some("plain") => DecodeMode::Plain,
        Some("dpsk") => DecodeMode::Dpsk,
        Some("ecc") => DecodeMode::Ecc,
        Some("spreading") => {
            let seed = spreading_seed.ok_or_else(|| {
                MarkError::Profile("spreading mode requires spreading_seed".into())
            })?;
            DecodeMode::Spreading { seed }
        }
        Some(other) => {
            return Err(MarkError::Profile(format!(
                "mode must be plain, dpsk, spreading, or ecc, got {other}"
            )))
        }
    };

    params.validate()?;

    let gateway_eui = gateway_eui
        .ok_or_else(|| MarkError::Profile("profile must name a gateway eui".into()))?;

    Ok(Profile {
        params,
        gateway_eui,
    })
}

fn strip_comment(val: &str) -> &str {
    match val.split_once(" #") {
        Some((before, _)) => before.trim(),
        None => val,
    }
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if (val.starts_with('"') && val.ends_with('"'))
        || (val.starts_with('\'') && val.ends_with('\''))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

/// Parse a decimal or 0x-prefixed integer.
fn parse_int_value(val: &str) -> Option<u32> {
    if let Some(hex) = val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}

fn parse_float(key: &str, val: &str) -> Result<f64> {
    val.parse()
        .map_err(|_| MarkError::Profile(format!("bad {key}: {val}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        assert!(DecodeParams::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_bits() {
        let params = DecodeParams {
            bits: 0,
            ..DecodeParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(MarkError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_overflowing_watermark_shift() {
        // A shift of 32 or more on a u32 counter has no defined value;
        // it must be rejected before any watermark is computed.
        for shift in [32u32, 40, u32::MAX] {
            let params = DecodeParams {
                watermark_shift: shift,
                ..DecodeParams::default()
            };
            assert!(
                matches!(
                    params.validate(),
                    Err(MarkError::InvalidConfiguration(_))
                ),
                "shift {shift} accepted"
            );
        }
        let params = DecodeParams {
            watermark_shift: 31,
            ..DecodeParams::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_wide_dpsk() {
        let params = DecodeParams {
            mode: DecodeMode::Dpsk,
            bits: 2,
            ..DecodeParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_hamming_ecc_width() {
        let params = DecodeParams {
            mode: DecodeMode::Ecc,
            bits: 3,
            ..DecodeParams::default()
        };
        assert!(params.validate().is_err());
        let params = DecodeParams {
            mode: DecodeMode::Ecc,
            bits: 4,
            ..DecodeParams::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_parse_profile_dpsk() {
        let text = r#"
channel:
  nominal: 300.0
  tolerance: 0.020
  phase_delta: 0.040
  bits: 1

watermark:
  shift: 13
  key: 0xa5a5

mode: dpsk

gateway:
  eui: "58A0CBFFFE802A21"
  source: time
"#;
        let profile = parse_profile(text).unwrap();
        assert_eq!(profile.params.nominal_s, 300.0);
        assert_eq!(profile.params.tolerance_s, 0.020);
        assert_eq!(profile.params.phase_delta_s, 0.040);
        assert_eq!(profile.params.bits, 1);
        assert_eq!(profile.params.watermark_key, 0xA5A5);
        assert_eq!(profile.params.mode, DecodeMode::Dpsk);
        assert_eq!(profile.params.source, TimeSource::GatewayTime);
        assert_eq!(profile.gateway_eui, "58A0CBFFFE802A21");
    }

    #[test]
    fn test_parse_profile_spreading() {
        let text = r#"
channel:
  nominal: 300.0
  tolerance: 0.010
  phase_delta: 0.050
  bits: 4

mode: spreading
spreading_seed: 0xbeef

gateway:
  eui: "58A0CBFFFE802A21"
  source: counter
"#;
        let profile = parse_profile(text).unwrap();
        assert_eq!(
            profile.params.mode,
            DecodeMode::Spreading { seed: 0xBEEF }
        );
        assert_eq!(profile.params.source, TimeSource::GatewayCounter);
    }

    #[test]
    fn test_parse_profile_spreading_needs_seed() {
        let text = "mode: spreading\ngateway:\n  eui: \"AA\"\n";
        assert!(matches!(
            parse_profile(text),
            Err(MarkError::Profile(_))
        ));
    }

    #[test]
    fn test_parse_profile_rejects_out_of_range_bits() {
        // 257 would truncate to 1 through a bare cast.
        let text = "channel:\n  bits: 257\ngateway:\n  eui: \"AA\"\n";
        assert!(matches!(parse_profile(text), Err(MarkError::Profile(_))));
    }

    #[test]
    fn test_parse_profile_rejects_out_of_range_seed() {
        let text = "mode: spreading\nspreading_seed: 0x10000\ngateway:\n  eui: \"AA\"\n";
        assert!(matches!(parse_profile(text), Err(MarkError::Profile(_))));
    }

    #[test]
    fn test_parse_profile_needs_gateway() {
        let text = "mode: plain\n";
        assert!(parse_profile(text).is_err());
    }

    #[test]
    fn test_parse_profile_inline_comment() {
        let text = r#"
channel:
  bits: 4

mode: ecc

gateway:
  eui: "AC1F09FFFE004F1F"
  source: time   # calendar field
"#;
        let profile = parse_profile(text).unwrap();
        assert_eq!(profile.params.mode, DecodeMode::Ecc);
        assert_eq!(profile.params.source, TimeSource::GatewayTime);
    }
}
