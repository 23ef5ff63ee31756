use crate::collectors::host::{CommandRunner, ProbeError};
use crate::snapshot::UNKNOWN;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const DF_TIMEOUT: Duration = Duration::from_secs(3);

fn read_proc(proc_root: &Path, name: &str) -> Result<String, ProbeError> {
    let path = proc_root.join(name);
    fs::read_to_string(&path).map_err(|source| ProbeError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn read_uptime_seconds(proc_root: &Path) -> u64 {
    match read_proc(proc_root, "uptime").and_then(|text| parse_uptime(&text)) {
        Ok(v) => v,
        Err(err) => {
            debug!(probe = "uptime", error = %err, "uptime недоступен");
            0
        }
    }
}

fn parse_uptime(text: &str) -> Result<u64, ProbeError> {
    let parse_err = |detail: &str| ProbeError::Parse {
        source_name: "uptime".to_string(),
        detail: detail.to_string(),
    };
    let first = text
        .split_whitespace()
        .next()
        .ok_or_else(|| parse_err("пустой файл"))?;
    let secs = first
        .parse::<f64>()
        .map_err(|err| parse_err(&err.to_string()))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(parse_err("некорректное значение"));
    }
    Ok(secs.floor() as u64)
}

pub fn read_load_avg(proc_root: &Path) -> String {
    match read_proc(proc_root, "loadavg").and_then(|text| parse_load_avg(&text)) {
        Ok(v) => v,
        Err(err) => {
            debug!(probe = "load", error = %err, "loadavg недоступен");
            UNKNOWN.to_string()
        }
    }
}

fn parse_load_avg(text: &str) -> Result<String, ProbeError> {
    let fields: Vec<&str> = text.split_whitespace().take(3).collect();
    if fields.len() < 3 {
        return Err(ProbeError::Parse {
            source_name: "loadavg".to_string(),
            detail: format!("ожидалось 3 поля, получено {}", fields.len()),
        });
    }
    Ok(fields.join(" "))
}

/// Returns `(used, total)` in MiB.
pub fn read_memory_mb(proc_root: &Path) -> (u64, u64) {
    match read_proc(proc_root, "meminfo") {
        Ok(text) => parse_meminfo_mb(&text),
        Err(err) => {
            debug!(probe = "memory", error = %err, "meminfo недоступен");
            (0, 0)
        }
    }
}

fn parse_meminfo_mb(text: &str) -> (u64, u64) {
    let mut vals: HashMap<&str, u64> = HashMap::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let key = key.trim_end_matches(':');
        vals.insert(key, value.parse::<u64>().unwrap_or(0));
    }

    let total_kb = vals.get("MemTotal").copied().unwrap_or(0);
    let avail_kb = vals.get("MemAvailable").copied().unwrap_or(0);
    let used_kb = total_kb.saturating_sub(avail_kb);
    (used_kb / 1024, total_kb / 1024)
}

/// Usage of the root filesystem as reported by `df -h /`, e.g. `47%`.
pub async fn read_disk_used_pct<R: CommandRunner>(runner: &R) -> String {
    let deadline = Instant::now() + DF_TIMEOUT;
    let result = runner
        .run("df", &["-h", "/"], deadline)
        .await
        .and_then(|out| parse_df_used_pct(&out));
    match result {
        Ok(v) => v,
        Err(err) => {
            debug!(probe = "disk", error = %err, "df недоступен");
            UNKNOWN.to_string()
        }
    }
}

fn parse_df_used_pct(output: &str) -> Result<String, ProbeError> {
    let parse_err = |detail: &str| ProbeError::Parse {
        source_name: "df".to_string(),
        detail: detail.to_string(),
    };
    let line = output
        .trim()
        .lines()
        .nth(1)
        .ok_or_else(|| parse_err("нет строки с данными"))?;
    line.split_whitespace()
        .nth(4)
        .map(str::to_string)
        .ok_or_else(|| parse_err("меньше 5 полей"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_floored() {
        assert_eq!(parse_uptime("12345.99 54321.00\n").unwrap(), 12345);
        assert!(parse_uptime("").is_err());
        assert!(parse_uptime("abc 1").is_err());
    }

    #[test]
    fn load_avg_takes_first_three_fields() {
        assert_eq!(
            parse_load_avg("0.52 0.58 0.59 1/467 12345\n").unwrap(),
            "0.52 0.58 0.59"
        );
        assert!(parse_load_avg("0.52 0.58").is_err());
    }

    #[test]
    fn meminfo_converts_to_mib() {
        let text = "MemTotal:       16318480 kB\nMemFree:         1234567 kB\nMemAvailable:    8159240 kB\n";
        assert_eq!(parse_meminfo_mb(text), (7968, 15936));
    }

    #[test]
    fn meminfo_without_available_reports_all_used() {
        let text = "MemTotal:       2048000 kB\nMemFree:         1024 kB\n";
        assert_eq!(parse_meminfo_mb(text), (2000, 2000));
    }

    #[test]
    fn meminfo_never_reports_used_above_total() {
        let text = "MemTotal: 1024 kB\nMemAvailable: 4096 kB\n";
        let (used, total) = parse_meminfo_mb(text);
        assert!(used <= total);
    }

    #[test]
    fn df_fifth_field_of_second_line() {
        let out = "Filesystem      Size  Used Avail Use% Mounted on\n/dev/sda1        40G   18G   20G  47% /\n";
        assert_eq!(parse_df_used_pct(out).unwrap(), "47%");
        assert!(parse_df_used_pct("Filesystem Size\n").is_err());
        assert!(parse_df_used_pct("header\n/dev/sda1 40G\n").is_err());
    }

    #[test]
    fn missing_proc_files_yield_unknowns() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_uptime_seconds(dir.path()), 0);
        assert_eq!(read_load_avg(dir.path()), "unknown");
        assert_eq!(read_memory_mb(dir.path()), (0, 0));
    }

    #[test]
    fn proc_files_are_read_from_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("uptime"), "3600.7 100.0\n").unwrap();
        fs::write(dir.path().join("loadavg"), "1.00 2.00 3.00 1/1 1\n").unwrap();
        assert_eq!(read_uptime_seconds(dir.path()), 3600);
        assert_eq!(read_load_avg(dir.path()), "1.00 2.00 3.00");
    }
}
