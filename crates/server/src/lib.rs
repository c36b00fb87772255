//! HTTP server for the reelpress conversion orchestrator.

pub mod api;
pub mod metrics;
pub mod state;
