//! Event delivery and status reporting.

pub mod events;
pub mod reporter;
