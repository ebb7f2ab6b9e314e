//! Track decoding and buffering helpers.

mod buffer;
mod convert;
mod resample;
mod source;
mod worker;

pub use resample::FormatConverter;
pub use source::{AudioSource, Buffers, DEFAULT_BUFFER_FRAMES};
pub(crate) use worker::{spawn_decode_worker, DecodeWorkerArgs};
