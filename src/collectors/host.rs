use chrono::{DateTime, Utc};
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::{self, Instant};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("не удалось прочитать {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("не удалось запустить {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} не завершился до дедлайна")]
    Timeout { program: String },
    #[error("{program} завершился с кодом {code:?}")]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stdout: String,
    },
    #[error("не удалось разобрать вывод {source_name}: {detail}")]
    Parse { source_name: String, detail: String },
    #[error("не удалось разрешить {host}: {detail}")]
    Resolve { host: String, detail: String },
}

/// Runs an external command and returns its stdout.
///
/// Implementations must give up at `deadline` and classify the outcome:
/// spawn failure, timeout, or nonzero exit are all errors.
pub trait CommandRunner: Send + Sync + 'static {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        deadline: Instant,
    ) -> impl Future<Output = Result<String, ProbeError>> + Send;
}

pub trait Resolver: Send + Sync + 'static {
    fn lookup(&self, host: &str) -> impl Future<Output = Result<Vec<IpAddr>, ProbeError>> + Send;
}

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        deadline: Instant,
    ) -> Result<String, ProbeError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Dropping the wait future on timeout kills the child.
        let output = match time::timeout_at(deadline, child.wait_with_output()).await {
            Ok(res) => res.map_err(|source| ProbeError::Io {
                path: program.to_string(),
                source,
            })?,
            Err(_elapsed) => {
                return Err(ProbeError::Timeout {
                    program: program.to_string(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(ProbeError::ExitStatus {
                program: program.to_string(),
                code: output.status.code(),
                stdout,
            });
        }
        Ok(stdout)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ProbeError> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|err| ProbeError::Resolve {
                host: host.to_string(),
                detail: err.to_string(),
            })?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = SystemRunner
            .run("statusd-definitely-missing-binary", &[], deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let deadline = Instant::now() + Duration::from_millis(100);
        let err = SystemRunner.run("sleep", &["5"], deadline).await.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_classified() {
        let deadline = Instant::now() + Duration::from_secs(2);
        let err = SystemRunner.run("false", &[], deadline).await.unwrap_err();
        assert!(matches!(err, ProbeError::ExitStatus { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn localhost_resolves() {
        let ips = SystemResolver.lookup("localhost").await.unwrap();
        assert!(!ips.is_empty());
    }
}
