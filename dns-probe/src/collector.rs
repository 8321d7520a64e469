//! Per-request adapter from a [`MetricSet`] to the `prometheus-client` encoder.

use std::fmt::Write;

use prometheus_client::collector::Collector;
use prometheus_client::encoding::{
    DescriptorEncoder, EncodeLabelValue, EncodeMetric, LabelValueEncoder,
};
use prometheus_client::metrics::MetricType;
use prometheus_client::metrics::gauge::ConstGauge;
use prometheus_client::registry::Registry;

use crate::metrics::{DESCRIPTORS, Descriptor, MetricObservation, MetricSet};

/// A fixed set of families and precomputed observations.
pub trait MetricSource {
    /// The families this source can emit.
    fn describe(&self) -> &[&'static Descriptor];

    /// The observations to expose, in order.
    fn collect(&self) -> &[MetricObservation];
}

/// Exposes one probe's [`MetricSet`] to a registry.
///
/// Built fresh for every request and dropped with the registry it is
/// registered in.
#[derive(Debug)]
pub struct EphemeralCollector {
    descriptors: &'static [&'static Descriptor],
    metrics: MetricSet,
}

impl EphemeralCollector {
    pub fn new(metrics: MetricSet) -> Self {
        Self {
            descriptors: &DESCRIPTORS,
            metrics,
        }
    }

    /// Encode the wrapped set in the text exposition format.
    pub fn encode_text(self) -> Result<String, std::fmt::Error> {
        let mut registry = Registry::default();
        registry.register_collector(Box::new(self));

        let mut body = String::new();
        prometheus_client::encoding::text::encode(&mut body, &registry)?;
        Ok(body)
    }
}

impl MetricSource for EphemeralCollector {
    fn describe(&self) -> &[&'static Descriptor] {
        self.descriptors
    }

    fn collect(&self) -> &[MetricObservation] {
        self.metrics.observations()
    }
}

impl Collector for EphemeralCollector {
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), std::fmt::Error> {
        for descriptor in self.describe() {
            let mut family = self
                .collect()
                .iter()
                .filter(|o| o.descriptor.name == descriptor.name)
                .peekable();

            // Families without samples are left out entirely.
            if family.peek().is_none() {
                continue;
            }

            let mut metric_encoder = encoder.encode_descriptor(
                descriptor.name,
                descriptor.help,
                None,
                MetricType::Gauge,
            )?;
            for observation in family {
                let labels: Vec<_> = observation
                    .labels
                    .iter()
                    .map(|(name, value)| (*name, EscapedLabelValue(value)))
                    .collect();
                let gauge = ConstGauge::new(observation.value);
                gauge.encode(metric_encoder.encode_family(&labels)?)?;
            }
        }

        Ok(())
    }
}

/// Label value written with `\`, `"` and newlines escaped.
///
/// Target and server are request input and may contain any of them.
#[derive(Debug)]
struct EscapedLabelValue<'a>(&'a str);

impl EncodeLabelValue for EscapedLabelValue<'_> {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        for c in self.0.chars() {
            match c {
                '\\' => encoder.write_str("\\\\")?,
                '"' => encoder.write_str("\\\"")?,
                '\n' => encoder.write_str("\\n")?,
                _ => encoder.write_char(c)?,
            }
        }
        Ok(())
    }
}
