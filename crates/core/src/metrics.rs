use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub tags: BTreeMap<String, String>,
}

pub trait MetricsSink: Send + Sync {
    fn record(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

#[derive(Clone, Default)]
pub struct InMemoryMetricsSink {
    samples: Arc<Mutex<Vec<MetricSample>>>,
}

impl InMemoryMetricsSink {
    pub fn samples(&self) -> Vec<MetricSample> {
        match self.samples.lock() {
            Ok(samples) => samples.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn total_for(&self, name: &str) -> f64 {
        self.samples().iter().filter(|sample| sample.name == name).map(|sample| sample.value).sum()
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn record(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        let sample = MetricSample {
            name: name.to_owned(),
            value,
            tags: tags.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect(),
        };
        match self.samples.lock() {
            Ok(mut samples) => samples.push(sample),
            Err(poisoned) => poisoned.into_inner().push(sample),
        }
    }
}

/// Emits counters as structured tracing events so deployments without a
/// metrics backend still get them in the log stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        let tags = tags
            .iter()
            .map(|(key, tag_value)| format!("{key}={tag_value}"))
            .collect::<Vec<_>>()
            .join(",");
        tracing::info!(event_name = "metrics.record", metric = name, value, tags = %tags, "metric recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryMetricsSink, MetricsSink};

    #[test]
    fn in_memory_sink_accumulates_counter_totals() {
        let sink = InMemoryMetricsSink::default();
        sink.record("events.processed", 1.0, &[("event_type", "missed_call")]);
        sink.record("events.processed", 1.0, &[("event_type", "inbound_sms")]);
        sink.record("steps.completed", 3.0, &[]);

        assert_eq!(sink.total_for("events.processed"), 2.0);
        assert_eq!(sink.total_for("steps.completed"), 3.0);

        let samples = sink.samples();
        assert_eq!(samples[0].tags.get("event_type").map(String::as_str), Some("missed_call"));
    }
}
