//! Prometheus metrics for load observability.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabel(pub String);

impl prometheus_client::encoding::EncodeLabelSet for OutcomeLabel {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("outcome", self.0.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct LoaderMetrics {
    pub active_writers: Gauge,
    pub partitions_written: Counter,
    pub partitions_failed: Counter,
    pub rows_written: Counter,
    pub loads_completed: Family<OutcomeLabel, Counter>,
    pub registry: Arc<Registry>,
}

impl LoaderMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let active_writers = Gauge::default();
        registry.register(
            "fanload_active_writers",
            "Number of partition writers currently holding a connection",
            active_writers.clone(),
        );

        let partitions_written = Counter::default();
        registry.register(
            "fanload_partitions_written",
            "Partitions committed",
            partitions_written.clone(),
        );

        let partitions_failed = Counter::default();
        registry.register(
            "fanload_partitions_failed",
            "Partitions that failed to connect, encode or commit",
            partitions_failed.clone(),
        );

        let rows_written = Counter::default();
        registry.register(
            "fanload_rows_written",
            "Rows committed across all loads",
            rows_written.clone(),
        );

        let loads_completed = Family::<OutcomeLabel, Counter>::default();
        registry.register(
            "fanload_loads_completed",
            "Loads finished, by outcome",
            loads_completed.clone(),
        );

        Self {
            active_writers,
            partitions_written,
            partitions_failed,
            rows_written,
            loads_completed,
            registry: Arc::new(registry),
        }
    }

    pub fn record_load(&self, outcome: &str) {
        self.loads_completed
            .get_or_create(&OutcomeLabel(outcome.to_string()))
            .inc();
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for LoaderMetrics {
    fn default() -> Self {
        Self::new()
    }
}
