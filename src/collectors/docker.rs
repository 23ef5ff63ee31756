use crate::collectors::host::{CommandRunner, ProbeError};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const DOCKER_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerMetrics {
    pub running: usize,
    pub mean_runtime_minutes: f64,
}

// Only a failing `docker ps` is an error.
pub async fn collect_containers<R: CommandRunner>(
    runner: &R,
    now: DateTime<Utc>,
) -> Result<ContainerMetrics, ProbeError> {
    let deadline = Instant::now() + DOCKER_TIMEOUT;
    let listing = runner
        .run("docker", &["ps", "-q", "--no-trunc"], deadline)
        .await?;

    let ids: Vec<&str> = listing
        .trim()
        .lines()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Ok(ContainerMetrics {
            running: 0,
            mean_runtime_minutes: 0.0,
        });
    }

    let mut args = vec!["inspect", "--format", "{{.State.StartedAt}}"];
    args.extend(ids.iter().copied());
    let mean_runtime_minutes = match runner.run("docker", &args, deadline).await {
        Ok(out) => mean_runtime_minutes(&out, now),
        Err(err) => {
            debug!(error = %err, "docker inspect не удался, время работы не посчитано");
            0.0
        }
    };

    Ok(ContainerMetrics {
        running: ids.len(),
        mean_runtime_minutes,
    })
}

fn mean_runtime_minutes(inspect_output: &str, now: DateTime<Utc>) -> f64 {
    let mut sum_minutes = 0.0_f64;
    let mut seen = 0_u32;
    for line in inspect_output.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        let Ok(started) = DateTime::parse_from_rfc3339(line) else {
            continue;
        };
        let elapsed = now.signed_duration_since(started.with_timezone(&Utc));
        sum_minutes += elapsed.num_milliseconds() as f64 / 60_000.0;
        seen += 1;
    }

    if seen == 0 {
        0.0
    } else {
        sum_minutes / f64::from(seen)
    }
}
