//! GPU Market Watch
//!
//! Daily pipeline that collects hourly GPU rental pricing from independent
//! infrastructure providers, normalizes the heterogeneous responses into one
//! canonical schema, merges them deterministically with prior state, and
//! publishes artifacts only when content actually changes.

pub mod config;
pub mod http;
pub mod merge;
pub mod orchestrator;
pub mod providers;
pub mod publish;
pub mod report;
pub mod schema;
