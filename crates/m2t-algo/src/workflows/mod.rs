//! High-level workflow facades over the pairing stages.
//!
//! The individual stages stay available as free functions; the facades wire
//! them together with a single configuration and collect the diagnostics.

pub mod pairing;

pub use pairing::{MeterPairing, PairingReport};
