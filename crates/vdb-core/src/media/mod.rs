//! Ports for the external media tools (extractor + transcoder).

pub mod client;
pub mod process;
pub mod types;
