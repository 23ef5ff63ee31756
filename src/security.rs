use crate::snapshot::{
    SecuritySnapshot, SecurityTask, SecurityTasksPayload, STATUS_DEGRADED, STATUS_OK,
};
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

pub const SNAPSHOT_FILE: &str = "security-latest.json";
pub const TASKS_FILE: &str = "security-tasks.json";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("файл {path} отсутствует")]
    Missing { path: String },
    #[error("не удалось прочитать {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("не удалось разобрать JSON в {path}: {source}")]
    Malformed {
        path: String,
        source: serde_json::Error,
    },
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let path_display = path.display().to_string();
    let bytes = fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ArtifactError::Missing {
                path: path_display.clone(),
            }
        } else {
            ArtifactError::Read {
                path: path_display.clone(),
                source,
            }
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Malformed {
        path: path_display,
        source,
    })
}

pub fn load_snapshot(path: &Path, now: &str) -> SecuritySnapshot {
    match read_artifact::<SecuritySnapshot>(path) {
        Ok(mut snap) => {
            if snap.status.is_empty() {
                snap.status = STATUS_DEGRADED.to_string();
            }
            if snap.updated_at.is_empty() {
                snap.updated_at = now.to_string();
            }
            snap
        }
        Err(ArtifactError::Malformed { path, source }) => {
            warn!(path = %path, error = %source, "снимок безопасности повреждён");
            degraded_snapshot(UNKNOWN_RUN, "security snapshot is invalid JSON", now)
        }
        Err(err) => {
            debug!(error = %err, "снимок безопасности недоступен");
            degraded_snapshot("never", "security snapshot not generated yet", now)
        }
    }
}

const UNKNOWN_RUN: &str = "unknown";

fn degraded_snapshot(last_run: &str, error: &str, now: &str) -> SecuritySnapshot {
    SecuritySnapshot {
        status: STATUS_DEGRADED.to_string(),
        risk_score: 100,
        last_run: last_run.to_string(),
        error: error.to_string(),
        updated_at: now.to_string(),
        ..SecuritySnapshot::default()
    }
}

/// A missing file yields the bootstrap task.
pub fn load_tasks(path: &Path, now: &str) -> SecurityTasksPayload {
    match read_artifact::<SecurityTasksPayload>(path) {
        Ok(mut payload) => {
            if payload.status.is_empty() {
                payload.status = STATUS_OK.to_string();
            }
            if payload.generated.is_empty() {
                payload.generated = now.to_string();
            }
            payload
        }
        Err(ArtifactError::Malformed { path, source }) => {
            warn!(path = %path, error = %source, "список задач безопасности повреждён");
            SecurityTasksPayload {
                status: STATUS_DEGRADED.to_string(),
                generated: now.to_string(),
                tasks: Vec::new(),
            }
        }
        Err(err) => {
            debug!(error = %err, "список задач безопасности недоступен");
            SecurityTasksPayload {
                status: STATUS_DEGRADED.to_string(),
                generated: now.to_string(),
                tasks: vec![bootstrap_task()],
            }
        }
    }
}

fn bootstrap_task() -> SecurityTask {
    SecurityTask {
        id: "bootstrap-security-scan".to_string(),
        priority: "high".to_string(),
        title: "Run initial security scan".to_string(),
        impact: "No security findings are available yet".to_string(),
        effort: "low".to_string(),
        action: "Run deploy/scripts/run-security-scan.sh manually once and verify timer"
            .to_string(),
        status: "open".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2026-10-19T12:00:00Z";

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).expect("запись фикстуры");
        path
    }

    #[test]
    fn missing_snapshot_is_degraded_never_run() {
        let dir = tempfile::tempdir().unwrap();
        let snap = load_snapshot(&dir.path().join(SNAPSHOT_FILE), NOW);
        assert_eq!(snap.status, "degraded");
        assert_eq!(snap.risk_score, 100);
        assert_eq!(snap.last_run, "never");
        assert_eq!(snap.error, "security snapshot not generated yet");
        assert_eq!(snap.updated_at, NOW);
    }

    #[test]
    fn malformed_snapshot_is_degraded_unknown_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, SNAPSHOT_FILE, "{");
        let snap = load_snapshot(&path, NOW);
        assert_eq!(snap.status, "degraded");
        assert_eq!(snap.risk_score, 100);
        assert_eq!(snap.last_run, "unknown");
        assert!(!snap.error.is_empty());
    }

    #[test]
    fn valid_snapshot_is_returned_with_touch_ups() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, SNAPSHOT_FILE, r#"{"status":"ok","risk_score":12}"#);
        let snap = load_snapshot(&path, NOW);
        assert_eq!(snap.status, "ok");
        assert_eq!(snap.risk_score, 12);
        assert_eq!(snap.updated_at, NOW);
        assert!(snap.error.is_empty());

        let path = write(&dir, "no-status.json", r#"{"risk_score":3,"updated_at":"x"}"#);
        let snap = load_snapshot(&path, NOW);
        assert_eq!(snap.status, "degraded");
        assert_eq!(snap.updated_at, "x");
    }

    #[test]
    fn snapshot_findings_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{
            "status": "ok",
            "risk_score": 40,
            "last_run": "2026-10-18T03:00:00Z",
            "targets": ["https://example.net"],
            "findings": [{"tool":"trivy","severity":"HIGH","target":"nginx","cve":"CVE-2026-0001","summary":"s","timestamp":"t"}],
            "scan_runtime": "42s"
        }"#;
        let path = write(&dir, SNAPSHOT_FILE, body);
        let snap = load_snapshot(&path, NOW);
        assert_eq!(snap.findings.len(), 1);
        assert_eq!(snap.findings[0].cve, "CVE-2026-0001");
        assert_eq!(snap.targets, vec!["https://example.net".to_string()]);
        assert_eq!(snap.scan_runtime, "42s");
    }

    #[test]
    fn same_bytes_load_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, TASKS_FILE, r#"{"tasks":[{"id":"a","title":"t"}]}"#);
        assert_eq!(load_tasks(&path, NOW), load_tasks(&path, NOW));
    }

    #[test]
    fn missing_tasks_seed_bootstrap_task() {
        let dir = tempfile::tempdir().unwrap();
        let payload = load_tasks(&dir.path().join(TASKS_FILE), NOW);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.generated, NOW);
        assert_eq!(payload.tasks.len(), 1);
        assert_eq!(payload.tasks[0].id, "bootstrap-security-scan");
        assert_eq!(payload.tasks[0].status, "open");
    }

    #[test]
    fn malformed_tasks_yield_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, TASKS_FILE, "[1,2");
        let payload = load_tasks(&path, NOW);
        assert_eq!(payload.status, "degraded");
        assert!(payload.tasks.is_empty());
    }

    #[test]
    fn valid_tasks_default_to_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, TASKS_FILE, r#"{"tasks":[]}"#);
        let payload = load_tasks(&path, NOW);
        assert_eq!(payload.status, "ok");
        assert_eq!(payload.generated, NOW);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["tasks"], serde_json::json!([]));
    }
}
