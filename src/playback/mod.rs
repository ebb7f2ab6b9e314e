//! Mixing, output lifecycle and transport control.

pub mod engine;
pub mod graph;
pub mod output;
pub mod settings;
pub mod transport;
