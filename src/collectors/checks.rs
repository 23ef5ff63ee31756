use crate::collectors::host::{CommandRunner, ProbeError, Resolver};
use crate::snapshot::{ServiceState, STATUS_DEGRADED, STATUS_OK, UNKNOWN};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const MONITORED_SERVICES: [&str; 5] = ["caddy", "docker", "wg-quick@wg0", "fail2ban", "ufw"];

const SYSTEMCTL_TIMEOUT: Duration = Duration::from_secs(3);
const UNRESOLVED_SUFFIX: &str = ": unresolved";

pub async fn collect_services<R: CommandRunner>(runner: &R) -> Vec<ServiceState> {
    let mut out = Vec::with_capacity(MONITORED_SERVICES.len());
    for name in MONITORED_SERVICES {
        out.push(ServiceState {
            name: name.to_string(),
            status: service_state(runner, name).await,
        });
    }
    out
}

/// `systemctl is-active` exits nonzero for inactive units but still prints
/// the state, so that stdout is kept when present.
pub async fn service_state<R: CommandRunner>(runner: &R, name: &str) -> String {
    let deadline = Instant::now() + SYSTEMCTL_TIMEOUT;
    match runner.run("systemctl", &["is-active", name], deadline).await {
        Ok(out) => non_empty_or_unknown(&out),
        Err(ProbeError::ExitStatus { stdout, .. }) => non_empty_or_unknown(&stdout),
        Err(err) => {
            debug!(service = %name, error = %err, "systemctl недоступен");
            UNKNOWN.to_string()
        }
    }
}

fn non_empty_or_unknown(out: &str) -> String {
    let trimmed = out.trim_end();
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resolves every host and renders one `"<host>: <ip>[, <ip>]"` line each.
pub async fn collect_dns<D: Resolver>(resolver: &D, hosts: &[String]) -> Vec<String> {
    let mut details = Vec::with_capacity(hosts.len());
    for host in hosts {
        let ips = match resolver.lookup(host).await {
            Ok(ips) => ips,
            Err(err) => {
                debug!(host = %host, error = %err, "DNS-запрос не удался");
                Vec::new()
            }
        };
        if ips.is_empty() {
            details.push(format!("{host}{UNRESOLVED_SUFFIX}"));
            continue;
        }

        let mut rendered: Vec<String> = ips.iter().map(|ip| ip.to_string()).collect();
        rendered.sort();
        rendered.dedup();
        rendered.truncate(2);
        details.push(format!("{host}: {}", rendered.join(", ")));
    }
    details
}

pub fn dns_status(details: &[String]) -> &'static str {
    if details.iter().any(|d| d.contains("unresolved")) {
        STATUS_DEGRADED
    } else {
        STATUS_OK
    }
}
