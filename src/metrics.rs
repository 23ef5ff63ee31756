use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;

pub const VIEW_PUBLIC: &str = "public";
pub const VIEW_ADMIN: &str = "admin";

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub statusd_snapshot_refresh_total: CounterVec,
    pub statusd_snapshot_cache_hits_total: CounterVec,
    pub statusd_probe_failures_total: CounterVec,
    pub statusd_last_compose_timestamp_seconds: GaugeVec,
    pub statusd_scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let statusd_snapshot_refresh_total = CounterVec::new(
            opts!(
                "statusd_snapshot_refresh_total",
                "Number of snapshot recompositions by view"
            ),
            &["view"],
        )?;
        let statusd_snapshot_cache_hits_total = CounterVec::new(
            opts!(
                "statusd_snapshot_cache_hits_total",
                "Number of snapshots served from cache by view"
            ),
            &["view"],
        )?;
        let statusd_probe_failures_total = CounterVec::new(
            opts!(
                "statusd_probe_failures_total",
                "Number of failed probes by probe name"
            ),
            &["probe"],
        )?;
        let statusd_last_compose_timestamp_seconds = GaugeVec::new(
            opts!(
                "statusd_last_compose_timestamp_seconds",
                "Unix time of the last snapshot composition by view"
            ),
            &["view"],
        )?;
        let statusd_scrape_count_total = Counter::with_opts(opts!(
            "statusd_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;

        register(&registry, &statusd_snapshot_refresh_total)?;
        register(&registry, &statusd_snapshot_cache_hits_total)?;
        register(&registry, &statusd_probe_failures_total)?;
        register(&registry, &statusd_last_compose_timestamp_seconds)?;
        register(&registry, &statusd_scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            statusd_snapshot_refresh_total,
            statusd_snapshot_cache_hits_total,
            statusd_probe_failures_total,
            statusd_last_compose_timestamp_seconds,
            statusd_scrape_count_total,
        }))
    }

    pub fn record_refresh(&self, view: &str, composed_at_unix: i64) {
        self.statusd_snapshot_refresh_total
            .with_label_values(&[view])
            .inc();
        self.statusd_last_compose_timestamp_seconds
            .with_label_values(&[view])
            .set(composed_at_unix as f64);
    }

    pub fn record_cache_hit(&self, view: &str) {
        self.statusd_snapshot_cache_hits_total
            .with_label_values(&[view])
            .inc();
    }

    pub fn inc_probe_failure(&self, probe: &str) {
        self.statusd_probe_failures_total
            .with_label_values(&[probe])
            .inc();
    }

    pub fn inc_scrape_count(&self) {
        self.statusd_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
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
