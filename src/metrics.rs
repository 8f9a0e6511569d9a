use async_trait::async_trait;
use cadence::{BufferedUdpMetricSink, Counted, Gauged, Metric, QueuingMetricSink, StatsdClient, Timed};
use parking_lot::Mutex;
use std::net::UdpSocket;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Sink for engine counters, gauges and timings.
#[async_trait]
pub trait MetricsPublisher: Send + Sync {
    /// Adds one to a tagged counter
    async fn incr_with_tags(&self, key: &str, tags: &[(&str, &str)]);

    /// Adds `value` to an untagged counter
    async fn count(&self, key: &str, value: u64);

    /// Sets a gauge
    async fn gauge(&self, key: &str, value: u64);

    /// Records a tagged duration in milliseconds
    async fn time_with_tags(&self, key: &str, millis: u64, tags: &[(&str, &str)]);
}

/// Discards everything. The default when no statsd host is configured.
#[derive(Debug, Clone, Default)]
pub struct NoOpMetricsPublisher;

impl NoOpMetricsPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsPublisher for NoOpMetricsPublisher {
    async fn incr_with_tags(&self, _key: &str, _tags: &[(&str, &str)]) {}
    async fn count(&self, _key: &str, _value: u64) {}
    async fn gauge(&self, _key: &str, _value: u64) {}
    async fn time_with_tags(&self, _key: &str, _millis: u64, _tags: &[(&str, &str)]) {}
}

/// One metric observed by [`InMemoryMetricsPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    pub key: String,
    pub value: u64,
    pub tags: Vec<(String, String)>,
}

/// Captures every published metric. Used by tests to assert on what the
/// recorder emitted.
#[derive(Debug, Default)]
pub struct InMemoryMetricsPublisher {
    recorded: Mutex<Vec<RecordedMetric>>,
}

impl InMemoryMetricsPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<RecordedMetric> {
        self.recorded.lock().clone()
    }

    /// Metrics with the given key, in publication order
    pub fn by_key(&self, key: &str) -> Vec<RecordedMetric> {
        self.recorded
            .lock()
            .iter()
            .filter(|m| m.key == key)
            .cloned()
            .collect()
    }

    fn push(&self, key: &str, value: u64, tags: &[(&str, &str)]) {
        self.recorded.lock().push(RecordedMetric {
            key: key.to_string(),
            value,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }
}

#[async_trait]
impl MetricsPublisher for InMemoryMetricsPublisher {
    async fn incr_with_tags(&self, key: &str, tags: &[(&str, &str)]) {
        self.push(key, 1, tags);
    }

    async fn count(&self, key: &str, value: u64) {
        self.push(key, value, &[]);
    }

    async fn gauge(&self, key: &str, value: u64) {
        self.push(key, value, &[]);
    }

    async fn time_with_tags(&self, key: &str, millis: u64, tags: &[(&str, &str)]) {
        self.push(key, millis, tags);
    }
}

/// Sends metrics to statsd over UDP through a queuing cadence sink.
pub struct StatsdMetricsPublisher {
    client: StatsdClient,
}

impl StatsdMetricsPublisher {
    pub fn new(host: &str, prefix: &str) -> Result<Self, MetricsError> {
        Self::new_with_bind(host, prefix, "[::]:0")
    }

    /// Create a publisher sending from a specific local address
    pub fn new_with_bind(host: &str, prefix: &str, bind_addr: &str) -> Result<Self, MetricsError> {
        tracing::info!(
            metrics.host = host,
            metrics.prefix = prefix,
            metrics.bind = bind_addr,
            "Creating StatsdMetricsPublisher"
        );

        let socket =
            UdpSocket::bind(bind_addr).map_err(|e| MetricsError::CreationFailed(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| MetricsError::CreationFailed(e.to_string()))?;

        let buffered_sink = BufferedUdpMetricSink::from(host, socket)
            .map_err(|e| MetricsError::CreationFailed(e.to_string()))?;
        let queuing_sink = QueuingMetricSink::builder()
            .with_error_handler(move |error| {
                error!(error = %error, "Statsd sink dropped a metric");
            })
            .build(buffered_sink);

        Ok(Self {
            client: StatsdClient::from_sink(prefix, queuing_sink),
        })
    }

    fn send_tagged<'a, M>(mut builder: cadence::MetricBuilder<'a, 'a, M>, tags: &'a [(&'a str, &'a str)])
    where
        M: Metric + From<String>,
    {
        for (k, v) in tags {
            builder = builder.with_tag(*k, *v);
        }
        if let Err(e) = builder.try_send() {
            error!("Failed to send metric: {}", e);
        }
    }
}

#[async_trait]
impl MetricsPublisher for StatsdMetricsPublisher {
    async fn incr_with_tags(&self, key: &str, tags: &[(&str, &str)]) {
        debug!(metric.key = key, "Incrementing counter");
        Self::send_tagged(self.client.count_with_tags(key, 1u64), tags);
    }

    async fn count(&self, key: &str, value: u64) {
        if let Err(e) = self.client.count(key, value) {
            error!("Failed to send metric {}: {}", key, e);
        }
    }

    async fn gauge(&self, key: &str, value: u64) {
        if let Err(e) = self.client.gauge(key, value) {
            error!("Failed to send gauge {} = {}: {}", key, value, e);
        }
    }

    async fn time_with_tags(&self, key: &str, millis: u64, tags: &[(&str, &str)]) {
        Self::send_tagged(self.client.time_with_tags(key, millis), tags);
    }
}

/// Publisher handle shared across the engine and consumer.
pub type SharedMetricsPublisher = Arc<dyn MetricsPublisher>;

/// Failure to set up a metrics publisher.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("error-assetrules-metrics-1 Failed to create metrics publisher: {0}")]
    CreationFailed(String),
}

/// Statsd when a host is configured, otherwise a no-op publisher.
pub fn create_metrics_publisher(
    statsd_host: Option<&str>,
    prefix: &str,
) -> Result<SharedMetricsPublisher, MetricsError> {
    match statsd_host {
        Some(host) => Ok(Arc::new(StatsdMetricsPublisher::new(host, prefix)?)),
        None => Ok(Arc::new(NoOpMetricsPublisher::new())),
    }
}
