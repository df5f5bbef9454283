//! Ingestion runs: page loop, per-run aggregation and progress delivery.

pub mod aggregates;
pub mod dedup;
pub mod handlers;
pub mod location;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod stream_hub;
#[cfg(test)]
pub mod testing;
pub mod text;
