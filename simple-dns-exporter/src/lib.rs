//! Prometheus exporter that probes DNS servers on demand.
//!
//! Each scrape of `/probe?target=<name>&server=<host[:port]>` performs one `A`
//! query and answers with the resulting gauges. Nothing is cached between
//! requests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   HTTP Server   │────>│     Prober      │────>│   DNS Server    │
//! │    (/probe)     │<────│  (dns-probe)    │<────│   (UDP/TCP)     │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! simple-dns-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod http;
pub mod logging;

pub use config::ExporterConfig;
pub use http::HttpServer;
pub use logging::init_tracing;
