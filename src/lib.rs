//! Kingdom Sim Library
//!
//! Tick-driven map simulation core: a quadtree spatial index with per-layer
//! viewport culling, cooperative per-entity task queues, and formations that
//! move and fight as one.
//!
//! # Features
//!
//! - `metrics_extended` - quadtree shape gauges in the metrics registry (enabled by default)

pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod sim;
pub mod spatial;
pub mod util;
