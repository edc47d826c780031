use crate::config::BuildInfo;
use prometheus::core::Collector;
use prometheus::{
    histogram_opts, opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters describing the agent itself, not the host it samples.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    started_at: Instant,
    pub agent_requests_total: CounterVec,
    pub agent_auth_failures_total: Counter,
    pub agent_collect_errors_total: CounterVec,
    pub agent_collect_duration_seconds: HistogramVec,
    pub agent_uptime_seconds: Gauge,
    pub agent_build_info: GaugeVec,
}

impl Metrics {
    pub fn new(build: &BuildInfo) -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let agent_requests_total = CounterVec::new(
            opts!("agent_requests_total", "Requests served by endpoint"),
            &["endpoint"],
        )?;
        let agent_auth_failures_total = Counter::with_opts(opts!(
            "agent_auth_failures_total",
            "Requests rejected because of a missing or wrong token"
        ))?;
        let agent_collect_errors_total = CounterVec::new(
            opts!(
                "agent_collect_errors_total",
                "Failed collections by payload or extended section"
            ),
            &["section"],
        )?;
        let agent_collect_duration_seconds = HistogramVec::new(
            histogram_opts!(
                "agent_collect_duration_seconds",
                "Wall time spent sampling one payload",
                vec![0.25, 0.5, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0]
            ),
            &["payload"],
        )?;
        let agent_uptime_seconds =
            Gauge::with_opts(opts!("agent_uptime_seconds", "Agent process uptime"))?;
        let agent_build_info = GaugeVec::new(
            opts!("agent_build_info", "Build metadata, value is always 1"),
            &["version", "git_sha"],
        )?;

        register(&registry, &agent_requests_total)?;
        register(&registry, &agent_auth_failures_total)?;
        register(&registry, &agent_collect_errors_total)?;
        register(&registry, &agent_collect_duration_seconds)?;
        register(&registry, &agent_uptime_seconds)?;
        register(&registry, &agent_build_info)?;

        agent_build_info
            .with_label_values(&[&build.version, &build.git_sha])
            .set(1.0);

        Ok(Arc::new(Self {
            registry,
            started_at: build.started_at,
            agent_requests_total,
            agent_auth_failures_total,
            agent_collect_errors_total,
            agent_collect_duration_seconds,
            agent_uptime_seconds,
            agent_build_info,
        }))
    }

    pub fn inc_request(&self, endpoint: &str) {
        self.agent_requests_total
            .with_label_values(&[endpoint])
            .inc();
    }

    pub fn inc_auth_failure(&self) {
        self.agent_auth_failures_total.inc();
    }

    pub fn inc_collect_error(&self, section: &str) {
        self.agent_collect_errors_total
            .with_label_values(&[section])
            .inc();
    }

    pub fn observe_collect(&self, payload: &str, elapsed: Duration) {
        self.agent_collect_duration_seconds
            .with_label_values(&[payload])
            .observe(elapsed.as_secs_f64());
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        self.agent_uptime_seconds
            .set(self.started_at.elapsed().as_secs_f64());

        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
