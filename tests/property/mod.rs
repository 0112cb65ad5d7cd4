// tests/property/mod.rs

//! Property-based tests for searchmux
//!
//! These tests use property-based testing to verify invariants that should
//! always hold, regardless of how input is chunked or interleaved.
