//! Cheap-model helper client.

pub mod client;

pub use client::{HttpLlmHelper, LlmHelperConfig};
