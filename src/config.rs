use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone)]
pub struct Config {
    pub relay: RelayConfig,
    pub storage: StorageConfig,
    pub audit: AuditConfig,
    pub publish: PublishConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn global() -> &'static Config {
        CONFIG.get_or_init(Self::load)
    }

    fn load() -> Self {
        dotenv::dotenv().ok();
        Self {
            relay: RelayConfig::load(),
            storage: StorageConfig::load(),
            audit: AuditConfig::load(),
            publish: PublishConfig::load(),
            log: LogConfig::load(),
        }
    }
}

// --- MODULES ---

// RELAY
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_host: String,
    /// Local port the device talks to (it believes this is the vendor server).
    pub device_listen_port: u16,
    /// Local port the vendor server answers to (it believes this is the device).
    pub server_listen_port: u16,
    pub device_ip: String,
    pub device_port: u16,
    pub upstream_host: String,
    pub upstream_port: u16,
    pub recv_buffer: usize,
    pub resolve_ttl_secs: u64,
    pub resolve_timeout_ms: u64,
}

impl RelayConfig {
    fn load() -> Self {
        Self {
            bind_host:          get_env("RELAY_BIND_HOST", "0.0.0.0"),
            device_listen_port: get_env("RELAY_DEVICE_PORT", "2001"),
            server_listen_port: get_env("RELAY_SERVER_PORT", "2000"),
            device_ip:          get_env("DEVICE_IP", "10.10.70.9"),
            device_port:        get_env("DEVICE_PORT", "2000"),
            upstream_host:      get_env("UPSTREAM_HOST", "dispatch.iothings.site"),
            upstream_port:      get_env("UPSTREAM_PORT", "2001"),
            recv_buffer:        get_env("RELAY_RECV_BUFFER", "65535"),
            resolve_ttl_secs:   get_env("UPSTREAM_RESOLVE_TTL_SECS", "300"),
            resolve_timeout_ms: get_env("UPSTREAM_RESOLVE_TIMEOUT_MS", "2000"),
        }
    }
}

// STORAGE
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    fn load() -> Self {
        Self {
            db_path: get_env_opt("RELAY_DB_PATH"),
        }
    }
}

// AUDIT
#[derive(Debug, Clone, Default)]
pub struct AuditConfig {
    pub log_path: Option<PathBuf>,
}

impl AuditConfig {
    fn load() -> Self {
        Self {
            log_path: get_env_opt("RELAY_AUDIT_LOG"),
        }
    }
}

// PUBLISH
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub enabled: bool,
    pub broker_host: String,
    pub broker_port: u16,
    pub namespace: String,
    pub client_name: String,
    pub device_id: Option<String>,
    pub keepalive_secs: u64,
    pub reconnect_ms: u64,
    pub channel_capacity: usize,
    pub publish_server_acks: bool,
}

impl PublishConfig {
    fn load() -> Self {
        Self {
            enabled:             get_env("PUBLISH_ENABLED", "true"),
            broker_host:         get_env("PUBLISH_BROKER_HOST", "127.0.0.1"),
            broker_port:         get_env("PUBLISH_BROKER_PORT", "1883"),
            namespace:           get_env("PUBLISH_NAMESPACE", "litter_robot"),
            client_name:         get_env("PUBLISH_CLIENT_NAME", "litter-relay"),
            device_id:           get_env_opt("PUBLISH_DEVICE_ID"),
            keepalive_secs:      get_env("PUBLISH_KEEPALIVE_SECS", "30"),
            reconnect_ms:        get_env("PUBLISH_RECONNECT_MS", "2000"),
            channel_capacity:    get_env("PUBLISH_CHAN_CAP", "1024"),
            publish_server_acks: get_env("PUBLISH_SERVER_ACKS", "false"),
        }
    }
}

// LOG
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
}

impl LogConfig {
    fn load() -> Self {
        Self {
            level: get_env("RELAY_LOG", "info"),
        }
    }
}

// --- PRIVATE HELPERS ---

fn get_env<T: std::str::FromStr>(key: &str, default: &str) -> T {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    match raw.parse() {
        Ok(value) => value,
        Err(_) => panic!("Config error: {} must be valid (got '{}')", key, raw),
    }
}

fn get_env_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| match raw.parse() {
            Ok(value) => value,
            Err(_) => panic!("Config error: {} must be valid (got '{}')", key, raw),
        })
}
