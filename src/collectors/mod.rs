pub mod checks;
pub mod docker;
pub mod host;
pub mod system;

use crate::config::Config;
use crate::metrics::{Metrics, VIEW_ADMIN, VIEW_PUBLIC};
use crate::security::{self, SNAPSHOT_FILE, TASKS_FILE};
use crate::snapshot::{
    AdminHealthSnapshot, PublicSecuritySummary, PublicSnapshot, SecuritySnapshot,
    SecurityTasksPayload, STATUS_DEGRADED, STATUS_OK, UNKNOWN,
};
use chrono::{DateTime, SecondsFormat, Utc};
use host::{Clock, CommandRunner, Resolver, SystemClock, SystemResolver, SystemRunner};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

pub const DOCKER_UNAVAILABLE_NOTE: &str = "docker metric unavailable";

struct Cached<T> {
    value: T,
    stored_at: DateTime<Utc>,
}

impl<T: Clone> Cached<T> {
    /// A clock that stepped backwards still counts as fresh.
    fn fresh(&self, now: DateTime<Utc>, ttl: Duration) -> Option<T> {
        let is_fresh = match (now - self.stored_at).to_std() {
            Ok(age) => age < ttl,
            Err(_) => true,
        };
        is_fresh.then(|| self.value.clone())
    }
}

#[derive(Default)]
struct SnapshotCache {
    public: Option<Cached<PublicSnapshot>>,
    admin: Option<Cached<AdminHealthSnapshot>>,
}

/// Composes the public and admin views on demand and keeps the latest of
/// each for `ttl`. All operations run under one lock, so concurrent callers
/// with a stale cache recompose one after another.
pub struct Collector<R = SystemRunner, D = SystemResolver, C = SystemClock> {
    runner: R,
    resolver: D,
    clock: C,
    metrics: Arc<Metrics>,
    ttl: Duration,
    data_dir: PathBuf,
    proc_root: PathBuf,
    dns_hosts: Vec<String>,
    cache: Mutex<SnapshotCache>,
}

impl Collector {
    pub fn new(cfg: &Config, metrics: Arc<Metrics>) -> Self {
        Self::with_host(cfg, SystemRunner, SystemResolver, SystemClock, metrics)
    }
}

impl<R, D, C> Collector<R, D, C>
where
    R: CommandRunner,
    D: Resolver,
    C: Clock,
{
    pub fn with_host(cfg: &Config, runner: R, resolver: D, clock: C, metrics: Arc<Metrics>) -> Self {
        Self {
            runner,
            resolver,
            clock,
            metrics,
            ttl: cfg.cache_ttl(),
            data_dir: cfg.data_dir.clone(),
            proc_root: cfg.proc_root.clone(),
            dns_hosts: cfg.dns_hosts.clone(),
            cache: Mutex::new(SnapshotCache::default()),
        }
    }

    #[cfg(test)]
    pub(crate) fn runner(&self) -> &R {
        &self.runner
    }

    pub async fn public(&self) -> PublicSnapshot {
        let mut cache = self.cache.lock().await;
        if let Some(hit) = cache
            .public
            .as_ref()
            .and_then(|c| c.fresh(self.clock.now(), self.ttl))
        {
            self.metrics.record_cache_hit(VIEW_PUBLIC);
            return hit;
        }

        let snapshot = self.compose_public().await;
        let stored_at = self.clock.now();
        cache.public = Some(Cached {
            value: snapshot.clone(),
            stored_at,
        });
        self.metrics.record_refresh(VIEW_PUBLIC, stored_at.timestamp());
        debug!(view = VIEW_PUBLIC, status = %snapshot.status, "снимок пересобран");
        snapshot
    }

    pub async fn admin_health(&self) -> AdminHealthSnapshot {
        let mut cache = self.cache.lock().await;
        if let Some(hit) = cache
            .admin
            .as_ref()
            .and_then(|c| c.fresh(self.clock.now(), self.ttl))
        {
            self.metrics.record_cache_hit(VIEW_ADMIN);
            return hit;
        }

        let snapshot = self.compose_admin().await;
        let stored_at = self.clock.now();
        cache.admin = Some(Cached {
            value: snapshot.clone(),
            stored_at,
        });
        self.metrics.record_refresh(VIEW_ADMIN, stored_at.timestamp());
        debug!(view = VIEW_ADMIN, status = %snapshot.status, "снимок пересобран");
        snapshot
    }

    pub async fn security(&self) -> SecuritySnapshot {
        let _guard = self.cache.lock().await;
        security::load_snapshot(&self.data_dir.join(SNAPSHOT_FILE), &self.timestamp_now())
    }

    pub async fn security_tasks(&self) -> SecurityTasksPayload {
        let _guard = self.cache.lock().await;
        security::load_tasks(&self.data_dir.join(TASKS_FILE), &self.timestamp_now())
    }

    async fn compose_public(&self) -> PublicSnapshot {
        let now = self.clock.now();
        let updated_at = format_timestamp(now);

        let load_avg = system::read_load_avg(&self.proc_root);
        let (memory_used_mb, memory_total_mb) = system::read_memory_mb(&self.proc_root);
        self.note_proc_failures(&load_avg, memory_total_mb);

        let security = PublicSecuritySummary::derive(
            &security::load_snapshot(&self.data_dir.join(SNAPSHOT_FILE), &updated_at),
            &security::load_tasks(&self.data_dir.join(TASKS_FILE), &updated_at),
        );

        let mut out = PublicSnapshot {
            status: STATUS_OK.to_string(),
            uptime_seconds: system::read_uptime_seconds(&self.proc_root),
            containers_up: 0,
            container_runtime_minutes: 0.0,
            load_avg,
            memory_used_mb,
            memory_total_mb,
            security,
            updated_at,
            note: String::new(),
        };

        match docker::collect_containers(&self.runner, now).await {
            Ok(containers) => {
                out.containers_up = containers.running as i64;
                out.container_runtime_minutes = containers.mean_runtime_minutes;
            }
            Err(err) => {
                debug!(view = VIEW_PUBLIC, error = %err, "docker недоступен");
                self.metrics.inc_probe_failure("docker");
                out.status = STATUS_DEGRADED.to_string();
                out.note = DOCKER_UNAVAILABLE_NOTE.to_string();
                out.containers_up = -1;
            }
        }
        out
    }

    async fn compose_admin(&self) -> AdminHealthSnapshot {
        let now = self.clock.now();

        let (memory_used_mb, memory_total_mb) = system::read_memory_mb(&self.proc_root);
        let disk_used_pct = system::read_disk_used_pct(&self.runner).await;
        if disk_used_pct == UNKNOWN {
            self.metrics.inc_probe_failure("disk");
        }
        let load_avg = system::read_load_avg(&self.proc_root);
        self.note_proc_failures(&load_avg, memory_total_mb);

        let (status, note, containers_up) =
            match docker::collect_containers(&self.runner, now).await {
                Ok(containers) => (STATUS_OK, String::new(), containers.running as i64),
                Err(err) => {
                    debug!(view = VIEW_ADMIN, error = %err, "docker недоступен");
                    self.metrics.inc_probe_failure("docker");
                    (STATUS_DEGRADED, DOCKER_UNAVAILABLE_NOTE.to_string(), -1)
                }
            };

        let services = checks::collect_services(&self.runner).await;
        let dns_details = checks::collect_dns(&self.resolver, &self.dns_hosts).await;
        let dns_status = checks::dns_status(&dns_details);
        if dns_status == STATUS_DEGRADED {
            self.metrics.inc_probe_failure("dns");
        }

        AdminHealthSnapshot {
            status: status.to_string(),
            load_avg,
            memory_used_mb,
            memory_total_mb,
            disk_used_pct,
            containers_up,
            services,
            dns_status: dns_status.to_string(),
            dns_details,
            updated_at: format_timestamp(now),
            note,
        }
    }

    fn note_proc_failures(&self, load_avg: &str, memory_total_mb: u64) {
        if load_avg == UNKNOWN {
            self.metrics.inc_probe_failure("load");
        }
        if memory_total_mb == 0 {
            self.metrics.inc_probe_failure("memory");
        }
    }

    fn timestamp_now(&self) -> String {
        format_timestamp(self.clock.now())
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
