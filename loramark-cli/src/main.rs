//! loramark: CLI for decoding the LoRaWAN timing channel from TTN captures.

use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use loramark_core::{
    decode_stream, parse_profile, DecodeMode, MessageState, Profile, SymbolReading, TimeSource,
};

mod ttn;

#[derive(Parser)]
#[command(
    name = "loramark",
    version,
    about = "LoRaWAN timing-channel decoder"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a capture file and print channel statistics
    Decode {
        /// Path to TTN capture (JSON array of uplink envelopes)
        file: PathBuf,

        /// Experiment profile (channel geometry, key, mode, gateway)
        #[arg(short, long)]
        profile: PathBuf,

        /// Print a per-message table instead of just the summary
        #[arg(short, long)]
        messages: bool,
    },

    /// Sort a capture file by frame counter
    Sort {
        /// Input capture file
        input: PathBuf,

        /// Output path for the sorted capture
        output: PathBuf,
    },

    /// Check a capture for ordering problems and coverage
    Check {
        /// Path to TTN capture
        file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            file,
            profile,
            messages,
        } => cmd_decode(file, profile, messages),
        Commands::Sort { input, output } => cmd_sort(input, output),
        Commands::Check { file } => cmd_check(file),
    }
}

fn read_to_string(path: &PathBuf) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", path.display());
        exit(1);
    })
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

fn cmd_decode(file: PathBuf, profile_path: PathBuf, show_messages: bool) {
    let profile: Profile = parse_profile(&read_to_string(&profile_path)).unwrap_or_else(|e| {
        eprintln!("Error in profile {}: {e}", profile_path.display());
        exit(1);
    });

    let envelopes = ttn::parse_capture(&read_to_string(&file)).unwrap_or_else(|e| {
        eprintln!("Error parsing {}: {e}", file.display());
        exit(1);
    });

    let records = ttn::extract_records(&envelopes, &profile.gateway_eui).unwrap_or_else(|e| {
        eprintln!("Error extracting records: {e}");
        exit(1);
    });

    info!(
        capture = %file.display(),
        envelopes = envelopes.len(),
        gateway = %profile.gateway_eui,
        "decoding capture"
    );

    let run = decode_stream(&profile.params, &records).unwrap_or_else(|e| {
        eprintln!("Decode error: {e}");
        exit(1);
    });

    for msg in &run.messages {
        match &msg.state {
            MessageState::First => {
                debug!(frame = msg.frame_counter, "stream start");
            }
            MessageState::Gap { lost } => {
                warn!(frame = msg.frame_counter, lost, "gap before frame");
            }
            MessageState::Adjacent(info) => match info.symbol_correct {
                Some(false) => info!(
                    frame = msg.frame_counter,
                    symbol = ?info.symbol.effective(),
                    expected = info.effective_watermark,
                    "symbol mismatch"
                ),
                Some(true) => debug!(frame = msg.frame_counter, "symbol verified"),
                None => debug!(frame = msg.frame_counter, "unverifiable slot"),
            },
        }
    }

    if show_messages {
        print_messages(&run, &profile);
    }

    let s = &run.summary;
    println!();
    println!("Capture: {}", file.display());
    println!(
        "  Messages: {} retained, {} skipped (no gateway reading)",
        s.messages, s.skipped
    );
    println!(
        "  Loss: {} frames ({:.2}%)",
        s.total_lost,
        s.loss_rate()
    );
    println!(
        "  Symbols: {} verifiable, {} errors ({:.2}% BER)",
        s.symbols_possible,
        s.symbol_errors,
        s.symbol_error_rate()
    );
    if profile.params.mode == DecodeMode::Ecc {
        println!(
            "  ECC: {} clean, {} corrected, {} uncorrectable",
            s.ecc.none, s.ecc.single, s.ecc.double
        );
    }
    println!();
}

fn print_messages(run: &loramark_core::DecodeRun, profile: &Profile) {
    let mut table = Table::new();
    table.set_header(vec![
        "Frame", "State", "Delta (s)", "Watermark", "Symbol", "OK", "SNR", "RSSI",
    ]);

    for msg in &run.messages {
        let (state, delta, watermark, symbol, ok) = match &msg.state {
            MessageState::First => ("first".into(), "-".into(), "-".into(), "-".into(), "-"),
            MessageState::Gap { lost } => (
                format!("gap({lost})"),
                "-".into(),
                "-".into(),
                "-".into(),
                "-",
            ),
            MessageState::Adjacent(info) => {
                let delta = match profile.params.source {
                    TimeSource::GatewayTime => info.gateway_delta,
                    TimeSource::GatewayCounter => info.modem_delta,
                };
                (
                    "adjacent".into(),
                    delta.map(|d| format!("{d:.6}")).unwrap_or("-".into()),
                    format!("{:#x}", info.effective_watermark),
                    format_symbol(&info.symbol),
                    match info.symbol_correct {
                        Some(true) => "yes",
                        Some(false) => "NO",
                        None => "-",
                    },
                )
            }
        };

        table.add_row(vec![
            Cell::new(msg.frame_counter),
            Cell::new(state),
            Cell::new(delta),
            Cell::new(watermark),
            Cell::new(symbol),
            Cell::new(ok),
            Cell::new(msg.snr.map(|v| format!("{v:.2}")).unwrap_or("-".into())),
            Cell::new(msg.rssi.map(|v| format!("{v:.0}")).unwrap_or("-".into())),
        ]);
    }

    println!("{table}");
}

fn format_symbol(symbol: &SymbolReading) -> String {
    match symbol {
        SymbolReading::Plain { symbol: Some(s) } => format!("{s:#x}"),
        SymbolReading::Plain { symbol: None } => "?".into(),
        SymbolReading::Dpsk { raw, combined } => match combined {
            Some(c) => format!("{c} (raw {raw})"),
            None => format!("? (raw {raw})"),
        },
        SymbolReading::Spreading {
            symbol,
            despread_delta,
        } => match symbol {
            Some(s) => format!("{s:#x} ({despread_delta:.6})"),
            None => format!("? ({despread_delta:.6})"),
        },
        SymbolReading::Ecc { errors, data } => match (errors, data) {
            (_, Some(d)) => format!("{d:#x} [{errors:?}]"),
            (Some(e), None) => format!("? [{e:?}]"),
            (None, None) => "?".into(),
        },
    }
}

// ---------------------------------------------------------------------------
// sort
// ---------------------------------------------------------------------------

fn cmd_sort(input: PathBuf, output: PathBuf) {
    let text = read_to_string(&input);
    let envelopes: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap_or_else(|e| {
        eprintln!("Error parsing {}: {e}", input.display());
        exit(1);
    });

    let sorted = sort_by_frame_counter(envelopes);

    let out = serde_json::to_string_pretty(&sorted).unwrap_or_else(|e| {
        eprintln!("Error serializing capture: {e}");
        exit(1);
    });
    std::fs::write(&output, out).unwrap_or_else(|e| {
        eprintln!("Error writing {}: {e}", output.display());
        exit(1);
    });

    info!(
        input = %input.display(),
        output = %output.display(),
        envelopes = sorted.len(),
        "capture sorted"
    );
}

/// Sort raw envelopes by frame counter, preserving unknown fields.
fn sort_by_frame_counter(mut envelopes: Vec<serde_json::Value>) -> Vec<serde_json::Value> {
    envelopes.sort_by_key(envelope_frame_counter);
    envelopes
}

fn envelope_frame_counter(envelope: &serde_json::Value) -> u64 {
    envelope["result"]["uplink_message"]["f_cnt"]
        .as_u64()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn cmd_check(file: PathBuf) {
    let envelopes: Vec<serde_json::Value> =
        serde_json::from_str(&read_to_string(&file)).unwrap_or_else(|e| {
            eprintln!("Error parsing {}: {e}", file.display());
            exit(1);
        });

    let mut out_of_order = 0u64;
    let mut duplicates = 0u64;
    let mut gaps = 0u64;
    let mut missing = 0u64;
    let mut prev: Option<u64> = None;

    for envelope in &envelopes {
        let frame = envelope_frame_counter(envelope);
        if let Some(p) = prev {
            if frame < p {
                warn!(frame, previous = p, "out-of-order envelope");
                out_of_order += 1;
            } else if frame == p {
                warn!(frame, "duplicate frame counter");
                duplicates += 1;
            } else if frame > p + 1 {
                gaps += 1;
                missing += frame - p - 1;
            }
        }
        prev = Some(frame);
    }

    println!();
    println!("Capture: {}", file.display());
    println!("  Envelopes:    {}", envelopes.len());
    println!("  Out of order: {out_of_order}");
    println!("  Duplicates:   {duplicates}");
    println!("  Gaps:         {gaps} ({missing} frames missing)");
    println!();

    if out_of_order > 0 || duplicates > 0 {
        eprintln!("Capture needs sorting before decoding (loramark sort)");
        exit(1);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(f_cnt: u64) -> serde_json::Value {
        json!({
            "result": {
                "received_at": "2022-06-23T20:54:01.625Z",
                "uplink_message": { "f_cnt": f_cnt, "frm_payload": "AA==" }
            }
        })
    }

    #[test]
    fn test_sort_by_frame_counter() {
        let sorted = sort_by_frame_counter(vec![envelope(5), envelope(2), envelope(9)]);
        let frames: Vec<u64> = sorted.iter().map(envelope_frame_counter).collect();
        assert_eq!(frames, vec![2, 5, 9]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_frames() {
        let mut a = envelope(3);
        a["result"]["uplink_message"]["marker"] = json!("first");
        let mut b = envelope(3);
        b["result"]["uplink_message"]["marker"] = json!("second");
        let sorted = sort_by_frame_counter(vec![a, b]);
        assert_eq!(
            sorted[0]["result"]["uplink_message"]["marker"],
            json!("first")
        );
    }

    #[test]
    fn test_missing_frame_counter_sorts_first() {
        let mut bare = envelope(0);
        bare["result"]["uplink_message"]
            .as_object_mut()
            .unwrap()
            .remove("f_cnt");
        let sorted = sort_by_frame_counter(vec![envelope(7), bare]);
        assert_eq!(envelope_frame_counter(&sorted[0]), 0);
        assert_eq!(envelope_frame_counter(&sorted[1]), 7);
    }
}
