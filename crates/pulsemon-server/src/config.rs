use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Shared signing key; empty disables signature verification.
    #[serde(default)]
    pub key: String,
    /// Path for snapshot dumps and restores.
    #[serde(default = "default_store_file")]
    pub store_file: String,
    /// Snapshot interval in seconds. Zero means synchronous mode:
    /// snapshot after every mutating call.
    #[serde(default = "default_store_interval_secs")]
    pub store_interval_secs: u64,
    /// Restore state from the snapshot file on startup.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// SQLite database path. When set, the durable backend replaces the
    /// in-memory store and the snapshot file is only a secondary dump.
    pub sqlite_path: Option<String>,
}

fn default_grpc_port() -> u16 {
    9090
}

fn default_http_port() -> u16 {
    8080
}

fn default_store_file() -> String {
    "pulsemon-metrics.json".to_string()
}

fn default_store_interval_secs() -> u64 {
    300
}

fn default_restore() -> bool {
    true
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.grpc_port, 9090);
        assert_eq!(config.http_port, 8080);
        assert!(config.key.is_empty());
        assert_eq!(config.store_interval_secs, 300);
        assert!(config.restore);
        assert!(config.sqlite_path.is_none());
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            grpc_port = 7001
            key = "secret"
            store_interval_secs = 0
            restore = false
            sqlite_path = "/var/lib/pulsemon/metrics.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.grpc_port, 7001);
        assert_eq!(config.key, "secret");
        assert_eq!(config.store_interval_secs, 0);
        assert!(!config.restore);
        assert_eq!(
            config.sqlite_path.as_deref(),
            Some("/var/lib/pulsemon/metrics.db")
        );
    }
}
