//! Utility functions and supporting infrastructure.
//!
//! Provides Hamming 8/4 and 24/18 decoding, odd-parity handling, bit reversal
//! and the error types shared by the decoder.

pub mod errors;
pub mod hamming;
