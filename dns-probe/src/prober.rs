//! The probe: one query, one exchange, one [`MetricSet`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::metrics::MetricSet;
use crate::outcome::{ErrorKind, ProbeResult, ResponseSummary};
use crate::query::{ProbeContext, Query};
use crate::resolver::{NetworkResolver, ResolverClient};

/// Runs DNS probes through a [`ResolverClient`].
pub struct Prober {
    resolver: Arc<dyn ResolverClient>,
}

/// Shareable prober handle.
pub type SharedProber = Arc<Prober>;

impl Prober {
    pub fn new(resolver: Arc<dyn ResolverClient>) -> Self {
        Self { resolver }
    }

    /// Probe `target` against `server` (`host:port`) within `ctx`.
    pub async fn probe(&self, target: &str, server: &str, ctx: &ProbeContext) -> MetricSet {
        self.run(&Query::new(target, server, ctx.clone())).await
    }

    /// Run a single query. Every failure is reported through the returned set.
    pub async fn run(&self, query: &Query) -> MetricSet {
        let result = self.exchange(query).await;

        debug!(
            instance = %query.target,
            server = %query.server,
            outcome = %result.outcome(),
            duration_ms = result.duration.as_millis() as u64,
            answers = result.response.answer_count,
            "Probe complete"
        );

        MetricSet::build(&query.target, &query.server, &result)
    }

    async fn exchange(&self, query: &Query) -> ProbeResult {
        let start = Instant::now();

        let message = match query.to_message() {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    instance = %query.target,
                    server = %query.server,
                    error = %e,
                    "Query build failed"
                );
                return ProbeResult {
                    response: ResponseSummary::default(),
                    error_kind: ErrorKind::Unknown,
                    duration: start.elapsed(),
                };
            }
        };

        let exchange = self
            .resolver
            .exchange(&message, &query.server, &query.context);
        let outcome = query.context.run(exchange).await;
        let duration = start.elapsed();

        match outcome {
            Ok(response) => ProbeResult {
                response: ResponseSummary::from(&response),
                error_kind: ErrorKind::None,
                duration,
            },
            Err(e) => {
                warn!(
                    instance = %query.target,
                    server = %query.server,
                    error = %e,
                    "Query failed"
                );
                ProbeResult {
                    response: ResponseSummary::default(),
                    error_kind: ErrorKind::from_exchange_error(&e),
                    duration,
                }
            }
        }
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new(Arc::new(NetworkResolver::new()))
    }
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober").finish_non_exhaustive()
    }
}
