//! Metric descriptors and the per-probe [`MetricSet`].

use crate::outcome::{Outcome, ProbeResult};

/// Label carrying the probed name.
pub const INSTANCE_LABEL: &str = "instance";
/// Label carrying the probed server.
pub const SERVER_LABEL: &str = "server";
/// Label carrying the outcome name.
pub const OUTCOME_LABEL: &str = "outcome";

/// A gauge family: name, help text and label schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

pub static OUTCOME: Descriptor = Descriptor {
    name: "simple_dns_exporter_outcome",
    help: "Query outcome",
    labels: &[INSTANCE_LABEL, SERVER_LABEL, OUTCOME_LABEL],
};

pub static DURATION: Descriptor = Descriptor {
    name: "simple_dns_exporter_duration",
    help: "Duration in seconds for query response. Omitted if timeout or no response.",
    labels: &[INSTANCE_LABEL, SERVER_LABEL],
};

pub static ANSWERS: Descriptor = Descriptor {
    name: "simple_dns_exporter_answers_total",
    help: "Total number of answers. Omitted if timeout or no response.",
    labels: &[INSTANCE_LABEL, SERVER_LABEL],
};

/// Every family a probe can emit, in exposition order.
pub static DESCRIPTORS: [&Descriptor; 3] = [&OUTCOME, &DURATION, &ANSWERS];

/// One gauge sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricObservation {
    pub descriptor: &'static Descriptor,
    pub value: f64,
    /// Label values, in the descriptor's label order.
    pub labels: Vec<(&'static str, String)>,
}

impl MetricObservation {
    /// Value of the label named `name`, if present.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// The complete set of observations for one probe.
///
/// Always holds one outcome observation per [`Outcome`] (exactly one of them
/// set to 1), followed by the duration and answer count observations when the
/// exchange succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSet {
    observations: Vec<MetricObservation>,
}

impl MetricSet {
    /// Build the observations for a probe of `target` against `server`.
    pub fn build(target: &str, server: &str, result: &ProbeResult) -> Self {
        let selected = result.outcome();
        let mut observations = Vec::with_capacity(Outcome::ALL.len() + 2);

        // All six rows, exactly one set.
        for outcome in Outcome::ALL {
            observations.push(MetricObservation {
                descriptor: &OUTCOME,
                value: if outcome == selected { 1.0 } else { 0.0 },
                labels: vec![
                    (INSTANCE_LABEL, target.to_string()),
                    (SERVER_LABEL, server.to_string()),
                    (OUTCOME_LABEL, outcome.as_str().to_string()),
                ],
            });
        }

        // Only present when a response was received.
        if result.is_success() {
            observations.push(MetricObservation {
                descriptor: &DURATION,
                value: result.duration.as_secs_f64(),
                labels: vec![
                    (INSTANCE_LABEL, target.to_string()),
                    (SERVER_LABEL, server.to_string()),
                ],
            });
            observations.push(MetricObservation {
                descriptor: &ANSWERS,
                value: result.response.answer_count as f64,
                labels: vec![
                    (INSTANCE_LABEL, target.to_string()),
                    (SERVER_LABEL, server.to_string()),
                ],
            });
        }

        Self { observations }
    }

    pub fn observations(&self) -> &[MetricObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Observations belonging to `descriptor`, in stored order.
    pub fn family<'a>(
        &'a self,
        descriptor: &'a Descriptor,
    ) -> impl Iterator<Item = &'a MetricObservation> + 'a {
        self.observations
            .iter()
            .filter(move |o| o.descriptor.name == descriptor.name)
    }

    /// Value of the outcome row for `outcome`.
    pub fn outcome_value(&self, outcome: Outcome) -> Option<f64> {
        self.family(&OUTCOME)
            .find(|o| o.label(OUTCOME_LABEL) == Some(outcome.as_str()))
            .map(|o| o.value)
    }

    /// The outcome whose row is set.
    pub fn outcome(&self) -> Option<Outcome> {
        Outcome::ALL
            .into_iter()
            .find(|o| self.outcome_value(*o) == Some(1.0))
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.family(&DURATION).next().map(|o| o.value)
    }

    pub fn answer_count(&self) -> Option<f64> {
        self.family(&ANSWERS).next().map(|o| o.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{ErrorKind, ResponseSummary};
    use hickory_proto::op::ResponseCode;
    use std::time::Duration;

    fn make_result(
        error_kind: ErrorKind,
        rcode: ResponseCode,
        answers: usize,
        ms: u64,
    ) -> ProbeResult {
        ProbeResult {
            response: ResponseSummary {
                rcode,
                answer_count: answers,
            },
            error_kind,
            duration: Duration::from_millis(ms),
        }
    }

    fn assert_one_hot(set: &MetricSet) {
        let values: Vec<f64> = set.family(&OUTCOME).map(|o| o.value).collect();
        assert_eq!(values.len(), 6);
        assert_eq!(values.iter().filter(|v| **v == 1.0).count(), 1);
        assert_eq!(values.iter().filter(|v| **v == 0.0).count(), 5);
    }

    #[test]
    fn test_descriptor_table() {
        let names: Vec<_> = DESCRIPTORS.iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "simple_dns_exporter_outcome",
                "simple_dns_exporter_duration",
                "simple_dns_exporter_answers_total",
            ]
        );
        assert_eq!(OUTCOME.labels, &["instance", "server", "outcome"]);
        assert_eq!(DURATION.labels, &["instance", "server"]);
        assert_eq!(ANSWERS.labels, &["instance", "server"]);
    }

    #[test]
    fn test_success_with_answers() {
        let result = make_result(ErrorKind::None, ResponseCode::NoError, 2, 120);
        let set = MetricSet::build("example.com", "1.1.1.1:53", &result);

        assert_eq!(set.len(), 8);
        assert_one_hot(&set);
        assert_eq!(set.outcome(), Some(Outcome::Success));
        assert_eq!(set.duration_seconds(), Some(0.12));
        assert_eq!(set.answer_count(), Some(2.0));
    }

    #[test]
    fn test_nxdomain_is_still_a_successful_exchange() {
        let result = make_result(ErrorKind::None, ResponseCode::NXDomain, 0, 30);
        let set = MetricSet::build("missing.example.com", "1.1.1.1:53", &result);

        assert_one_hot(&set);
        assert_eq!(set.outcome(), Some(Outcome::NameError));
        // The exchange itself completed, so timing is reported.
        assert_eq!(set.duration_seconds(), Some(0.03));
        assert_eq!(set.answer_count(), Some(0.0));
    }

    #[test]
    fn test_timeout_omits_duration_and_answers() {
        let result = make_result(ErrorKind::Timeout, ResponseCode::NoError, 0, 5000);
        let set = MetricSet::build("example.com", "10.0.0.1:53", &result);

        assert_eq!(set.len(), 6);
        assert_one_hot(&set);
        assert_eq!(set.outcome(), Some(Outcome::Timeout));
        assert_eq!(set.duration_seconds(), None);
        assert_eq!(set.answer_count(), None);
    }

    #[test]
    fn test_unknown_error_omits_duration_and_answers() {
        let result = make_result(ErrorKind::Unknown, ResponseCode::NoError, 0, 1);
        let set = MetricSet::build("example.com", "127.0.0.1:53", &result);

        assert_eq!(set.len(), 6);
        assert_eq!(set.outcome(), Some(Outcome::UnknownError));
        assert!(set.family(&DURATION).next().is_none());
        assert!(set.family(&ANSWERS).next().is_none());
    }

    #[test]
    fn test_one_hot_and_presence_for_all_inputs() {
        let rcodes = [
            ResponseCode::NoError,
            ResponseCode::FormErr,
            ResponseCode::ServFail,
            ResponseCode::NXDomain,
            ResponseCode::NotImp,
            ResponseCode::Refused,
            ResponseCode::NotZone,
            ResponseCode::BADVERS,
        ];

        for error_kind in [ErrorKind::None, ErrorKind::Timeout, ErrorKind::Unknown] {
            for rcode in rcodes {
                let result = make_result(error_kind, rcode, 1, 10);
                let set = MetricSet::build("a.example", "s:53", &result);

                assert_one_hot(&set);
                let success = error_kind == ErrorKind::None;
                assert_eq!(set.duration_seconds().is_some(), success);
                assert_eq!(set.answer_count().is_some(), success);
                assert_eq!(set.len(), if success { 8 } else { 6 });
            }
        }
    }

    #[test]
    fn test_labels_and_order() {
        let result = make_result(ErrorKind::None, ResponseCode::Refused, 0, 5);
        let set = MetricSet::build("example.com", "9.9.9.9:53", &result);

        let outcomes: Vec<_> = set
            .family(&OUTCOME)
            .map(|o| o.label(OUTCOME_LABEL).unwrap())
            .collect();
        assert_eq!(
            outcomes,
            vec![
                "NOERROR",
                "NXDOMAIN",
                "SERVFAIL",
                "other_rcode",
                "timeout",
                "unknown_error",
            ]
        );

        for observation in set.observations() {
            assert_eq!(observation.label(INSTANCE_LABEL), Some("example.com"));
            assert_eq!(observation.label(SERVER_LABEL), Some("9.9.9.9:53"));
            let names: Vec<_> = observation.labels.iter().map(|(k, _)| *k).collect();
            assert_eq!(names, observation.descriptor.labels);
        }

        let last = &set.observations()[set.len() - 1];
        assert_eq!(last.descriptor, &ANSWERS);
        assert_eq!(set.outcome(), Some(Outcome::OtherRcode));
    }
}
