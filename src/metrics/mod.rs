//! Metrics module
//!
//! Exposes cache and engine statistics to Prometheus.

mod exporter;

pub use exporter::StatsExporter;
