//! Classification of a single DNS exchange.

use std::fmt;
use std::time::Duration;

use hickory_proto::op::{Message, ResponseCode};

use crate::resolver::ExchangeError;

/// How the exchange failed, if it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorKind {
    /// A response was received.
    #[default]
    None,
    /// The deadline passed, the probe was cancelled, or the transport timed out.
    Timeout,
    /// Any other failure.
    Unknown,
}

impl ErrorKind {
    /// Classify an exchange error.
    ///
    /// Context expiry and transport timeouts are checked separately against the
    /// same error; whichever matches first decides.
    pub fn from_exchange_error(err: &ExchangeError) -> Self {
        if err.is_context_done() {
            return Self::Timeout;
        }
        if err.reports_timeout() {
            return Self::Timeout;
        }
        Self::Unknown
    }
}

/// The one-hot classification of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    NameError,
    ServerFailure,
    OtherRcode,
    Timeout,
    UnknownError,
}

impl Outcome {
    /// Every outcome, in exposition order.
    pub const ALL: [Outcome; 6] = [
        Outcome::Success,
        Outcome::NameError,
        Outcome::ServerFailure,
        Outcome::OtherRcode,
        Outcome::Timeout,
        Outcome::UnknownError,
    ];

    /// Value of the `outcome` label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "NOERROR",
            Outcome::NameError => "NXDOMAIN",
            Outcome::ServerFailure => "SERVFAIL",
            Outcome::OtherRcode => "other_rcode",
            Outcome::Timeout => "timeout",
            Outcome::UnknownError => "unknown_error",
        }
    }

    /// Pick the outcome for an error classification and response code.
    ///
    /// The response code only matters when no error occurred.
    pub fn classify(error_kind: ErrorKind, rcode: ResponseCode) -> Self {
        match (error_kind, rcode) {
            (ErrorKind::None, ResponseCode::NoError) => Outcome::Success,
            (ErrorKind::None, ResponseCode::NXDomain) => Outcome::NameError,
            (ErrorKind::None, ResponseCode::ServFail) => Outcome::ServerFailure,
            (ErrorKind::None, _) => Outcome::OtherRcode,
            (ErrorKind::Timeout, _) => Outcome::Timeout,
            (ErrorKind::Unknown, _) => Outcome::UnknownError,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a response the metrics consume.
///
/// The default value is the placeholder used when no response was received:
/// response code zero and no answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSummary {
    pub rcode: ResponseCode,
    pub answer_count: usize,
}

impl Default for ResponseSummary {
    fn default() -> Self {
        Self {
            rcode: ResponseCode::NoError,
            answer_count: 0,
        }
    }
}

impl From<&Message> for ResponseSummary {
    fn from(message: &Message) -> Self {
        Self {
            rcode: message.response_code(),
            answer_count: message.answers().len(),
        }
    }
}

/// Normalized result of one exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub response: ResponseSummary,
    pub error_kind: ErrorKind,
    /// Wall-clock time spent in the exchange.
    pub duration: Duration,
}

impl ProbeResult {
    pub fn outcome(&self) -> Outcome {
        Outcome::classify(self.error_kind, self.response.rcode)
    }

    pub fn is_success(&self) -> bool {
        self.error_kind == ErrorKind::None
    }
}
