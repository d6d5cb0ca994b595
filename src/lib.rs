//! cloudinv - cloud inventory extraction
//!
//! Declarative resource tables fetched from a provider API, flattened into
//! rows and written to a sink.

pub mod config;
pub mod engine;
pub mod provider;
pub mod schema;
pub mod tables;
