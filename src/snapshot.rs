use serde::{Deserialize, Serialize};

pub const STATUS_OK: &str = "ok";
pub const STATUS_DEGRADED: &str = "degraded";
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicSnapshot {
    pub status: String,
    pub uptime_seconds: u64,
    /// `-1` when the container engine could not be queried.
    pub containers_up: i64,
    pub container_runtime_minutes: f64,
    pub load_avg: String,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub security: PublicSecuritySummary,
    pub updated_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicSecuritySummary {
    pub posture: String,
    pub risk_band: String,
    pub last_scan: String,
    pub open_tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminHealthSnapshot {
    pub status: String,
    pub load_avg: String,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub disk_used_pct: String,
    pub containers_up: i64,
    pub services: Vec<ServiceState>,
    pub dns_status: String,
    pub dns_details: Vec<String>,
    pub updated_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Finding {
    pub tool: String,
    pub severity: String,
    pub target: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cve: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cve_url: String,
    pub summary: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySnapshot {
    pub status: String,
    pub risk_score: i64,
    pub last_run: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub scan_runtime: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityTask {
    pub id: String,
    pub priority: String,
    pub title: String,
    pub impact: String,
    pub effort: String,
    pub action: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityTasksPayload {
    pub status: String,
    pub generated: String,
    pub tasks: Vec<SecurityTask>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn from_score(score: i64) -> Self {
        if score >= 60 {
            Self::High
        } else if score >= 25 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl PublicSecuritySummary {
    pub fn derive(snapshot: &SecuritySnapshot, tasks: &SecurityTasksPayload) -> Self {
        let band = RiskBand::from_score(snapshot.risk_score);
        let posture = if snapshot.status == STATUS_OK && band == RiskBand::Low {
            "good"
        } else {
            "watch"
        };

        Self {
            posture: posture.to_string(),
            risk_band: band.as_str().to_string(),
            last_scan: snapshot.last_run.clone(),
            open_tasks: tasks.tasks.len(),
        }
    }
}
