//! Shared helpers for file decoding.

pub mod decode;
