//! Benchmarks for the Serin checker core. See `benches/core.rs`.
