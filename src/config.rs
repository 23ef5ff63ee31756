use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_LISTEN: &str = "STATUSD_LISTEN";
pub const ENV_CACHE_TTL_SECONDS: &str = "STATUSD_CACHE_TTL_SECONDS";
pub const ENV_DATA_DIR: &str = "STATUSD_DATA_DIR";
pub const ENV_WG_SUBNET: &str = "STATUSD_WG_SUBNET";
pub const ENV_DNS_HOSTS: &str = "STATUSD_DNS_HOSTS";
pub const ENV_PROC_ROOT: &str = "STATUSD_PROC_ROOT";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub listen: String,
    pub cache_ttl_seconds: u64,
    pub data_dir: PathBuf,
    /// Reserved; read and reported but not used by any probe yet.
    pub wg_subnet: String,
    pub dns_hosts: Vec<String>,
    pub proc_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            wg_subnet: DEFAULT_WG_SUBNET.to_string(),
            dns_hosts: default_dns_hosts(),
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let cfg = Self {
            listen: get(ENV_LISTEN)
                .map(|v| normalize_listen(&v))
                .unwrap_or(defaults.listen),
            cache_ttl_seconds: get(ENV_CACHE_TTL_SECONDS)
                .map(|v| coerce_ttl(&v))
                .unwrap_or(defaults.cache_ttl_seconds),
            data_dir: get(ENV_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            wg_subnet: get(ENV_WG_SUBNET).unwrap_or(defaults.wg_subnet),
            dns_hosts: get(ENV_DNS_HOSTS)
                .map(|v| parse_host_list(&v))
                .unwrap_or(defaults.dns_hosts),
            proc_root: get(ENV_PROC_ROOT)
                .map(PathBuf::from)
                .unwrap_or(defaults.proc_root),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_host_port(&self.listen) {
            return Err(ConfigError::Validation(format!(
                "{ENV_LISTEN} должен быть корректным адресом host:port, получено '{}'",
                self.listen
            )));
        }
        if self.cache_ttl_seconds < 1 {
            return Err(ConfigError::Validation(
                "cache_ttl_seconds должно быть >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

const DEFAULT_CACHE_TTL_SECONDS: u64 = 10;
const DEFAULT_DATA_DIR: &str = "/var/lib/statusd";
const DEFAULT_WG_SUBNET: &str = "10.8.0.0/24";
const DEFAULT_PROC_ROOT: &str = "/proc";

fn default_listen() -> String {
    "127.0.0.1:9191".to_string()
}

fn default_dns_hosts() -> Vec<String> {
    [
        "404n0tf0und.net",
        "admin.404n0tf0und.net",
        "security-admin.404n0tf0und.net",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// `:port` binds every interface.
pub fn normalize_listen(raw: &str) -> String {
    let raw = raw.trim();
    match raw.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => raw.to_string(),
    }
}

/// Accepts `ip:port` as well as `hostname:port`; the name is resolved at bind time.
fn is_host_port(addr: &str) -> bool {
    if addr.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

/// Unparsable or non-positive values fall back to the default.
fn coerce_ttl(raw: &str) -> u64 {
    match raw.trim().parse::<i64>() {
        Ok(v) if v > 0 => v as u64,
        _ => DEFAULT_CACHE_TTL_SECONDS,
    }
}

fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let cfg = from_map(&[]).expect("конфигурация по умолчанию");
        assert_eq!(cfg.listen, "127.0.0.1:9191");
        assert_eq!(cfg.cache_ttl_seconds, 10);
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/statusd"));
        assert_eq!(cfg.wg_subnet, "10.8.0.0/24");
        assert_eq!(cfg.dns_hosts.len(), 3);
        assert_eq!(cfg.proc_root, PathBuf::from("/proc"));
    }

    #[test]
    fn non_positive_ttl_is_coerced() {
        for raw in ["0", "-5", "abc"] {
            let cfg = from_map(&[(ENV_CACHE_TTL_SECONDS, raw)]).unwrap();
            assert_eq!(cfg.cache_ttl_seconds, 10, "ttl {raw}");
        }
        let cfg = from_map(&[(ENV_CACHE_TTL_SECONDS, "30")]).unwrap();
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let cfg = from_map(&[(ENV_LISTEN, ""), (ENV_DATA_DIR, "  ")]).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn overrides_are_read() {
        let cfg = from_map(&[
            (ENV_LISTEN, "0.0.0.0:8080"),
            (ENV_DATA_DIR, "/tmp/statusd"),
            (ENV_DNS_HOSTS, "a.example, b.example,,"),
            (ENV_WG_SUBNET, "10.9.0.0/24"),
        ])
        .unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:8080");
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/statusd"));
        assert_eq!(cfg.dns_hosts, vec!["a.example", "b.example"]);
        assert_eq!(cfg.wg_subnet, "10.9.0.0/24");
    }

    #[test]
    fn invalid_listen_is_rejected() {
        let err = from_map(&[(ENV_LISTEN, "not-an-addr")]).unwrap_err();
        assert!(err.to_string().contains(ENV_LISTEN));
    }

    #[test]
    fn hostname_listen_is_accepted() {
        assert!(is_host_port("localhost:9191"));
        assert!(is_host_port("[::1]:9191"));
        assert!(!is_host_port("localhost"));
        assert!(!is_host_port(":9191"));
        assert!(!is_host_port("localhost:99999"));
    }

    #[test]
    fn bare_port_listens_on_all_interfaces() {
        let cfg = from_map(&[(ENV_LISTEN, ":9191")]).expect("адрес только с портом");
        assert_eq!(cfg.listen, "0.0.0.0:9191");
        assert_eq!(normalize_listen("127.0.0.1:9191"), "127.0.0.1:9191");
        assert!(from_map(&[(ENV_LISTEN, ":abc")]).is_err());
    }

    #[test]
    fn yaml_dump_lists_fields() {
        let yaml = Config::default().to_yaml().unwrap();
        assert!(yaml.contains("127.0.0.1:9191"));
        assert!(yaml.contains("cache_ttl_seconds: 10"));
    }
}
