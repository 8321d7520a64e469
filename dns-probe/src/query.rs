//! Probe inputs.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query as Question};
use hickory_proto::rr::{DNSClass, Name, RecordType};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::resolver::ExchangeError;

/// Deadline and cancellation signal bounding a single probe.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    deadline: Instant,
    cancel: CancellationToken,
}

impl ProbeContext {
    /// Create a context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Create a context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token (usually a child of a server-wide token).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `exchange` until it completes, the deadline passes or the
    /// context is cancelled, whichever comes first.
    pub async fn run<T, F>(&self, exchange: F) -> std::result::Result<T, ExchangeError>
    where
        F: Future<Output = std::result::Result<T, ExchangeError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExchangeError::Canceled),
            result = tokio::time::timeout_at(self.deadline, exchange) => {
                result.unwrap_or(Err(ExchangeError::DeadlineExceeded))
            }
        }
    }
}

/// One probe request: which name to ask for, which server to ask, and how
/// long to wait.
#[derive(Debug, Clone)]
pub struct Query {
    /// Domain name to look up.
    pub target: String,
    /// Server to ask, as `host:port`.
    pub server: String,
    /// Bounds for the exchange.
    pub context: ProbeContext,
}

impl Query {
    pub fn new(
        target: impl Into<String>,
        server: impl Into<String>,
        context: ProbeContext,
    ) -> Self {
        Self {
            target: target.into(),
            server: server.into(),
            context,
        }
    }

    /// Build the outbound message: one `A`/`IN` question for the target as a
    /// fully-qualified name, recursion desired, random id.
    pub fn to_message(&self) -> Result<Message> {
        let name = fqdn(&self.target);
        let name = Name::from_str(&name).map_err(|source| Error::InvalidTarget {
            target: self.target.clone(),
            source,
        })?;

        let mut question = Question::new();
        question.set_name(name);
        question.set_query_type(RecordType::A);
        question.set_query_class(DNSClass::IN);

        let mut message = Message::new();
        message
            .set_id(fastrand::u16(..))
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(question);

        Ok(message)
    }
}

/// Append the root label if the name doesn't already end with one.
fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}
