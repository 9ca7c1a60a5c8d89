//! loramark-core: Pure decode library for the LoRaWAN timing channel.
//!
//! No async, no I/O — just algorithms. Turns an ordered capture of
//! uplink records into decoded timing-channel symbols, correctness
//! flags, and channel statistics. This crate is the shared core used
//! by the `loramark` CLI; envelope parsing and reporting live there.

pub mod config;
pub mod decoder;
pub mod hamming;
pub mod spreading;
pub mod symbol;
pub mod timebase;
pub mod types;
pub mod watermark;

// Re-export commonly used types at crate root
pub use config::{parse_profile, DecodeMode, DecodeParams, Profile, TimeSource};
pub use decoder::{decode_stream, DecodeRun};
pub use types::*;
