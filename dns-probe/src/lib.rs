//! Single-shot DNS probing for Prometheus exporters.
//!
//! This crate answers one question per call: how did an `A` query for a given
//! name behave against a given server? The answer is always a complete,
//! fixed-shape [`MetricSet`], never an error.
//!
//! - [`query`] - Probe inputs (`Query`, `ProbeContext`)
//! - [`resolver`] - The DNS exchange (`ResolverClient`, `NetworkResolver`)
//! - [`outcome`] - Classification of an exchange (`ErrorKind`, `Outcome`)
//! - [`metrics`] - Descriptor table and `MetricSet` construction
//! - [`collector`] - Per-request adapter to the `prometheus-client` encoder
//! - [`prober`] - The `Prober` tying the above together
//!
//! # Flow
//!
//! ```text
//! ┌──────────┐     ┌────────────────┐     ┌─────────────┐     ┌────────────────────┐
//! │  Prober  │────>│ ResolverClient │────>│  MetricSet  │────>│ EphemeralCollector │
//! │ (query)  │     │   (exchange)   │     │  (classify) │     │      (encode)      │
//! └──────────┘     └────────────────┘     └─────────────┘     └────────────────────┘
//! ```

pub mod collector;
pub mod error;
pub mod metrics;
pub mod outcome;
pub mod prober;
pub mod query;
pub mod resolver;

pub use collector::{EphemeralCollector, MetricSource};
pub use error::{Error, Result};
pub use metrics::{DESCRIPTORS, Descriptor, MetricObservation, MetricSet};
pub use outcome::{ErrorKind, Outcome, ProbeResult, ResponseSummary};
pub use prober::{Prober, SharedProber};
pub use query::{ProbeContext, Query};
pub use resolver::{ExchangeError, NetworkResolver, ResolverClient};
