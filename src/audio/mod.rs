//! Audio formats and per-track staging buffers.

pub mod buffer;
pub mod format;
