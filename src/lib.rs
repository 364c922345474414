#![deny(missing_docs)]

//! Core library for the Rusty Summarizer streaming map-reduce server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Text generation engines reached over HTTP.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Chunking, backend strategies, and pipeline orchestration.
pub mod processing;
/// Line-oriented streaming protocol encoder and decoder.
pub mod protocol;
