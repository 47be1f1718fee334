//! Process configuration from a `key=value` file.
//!
//! An explicit value object constructed at startup and passed to whoever
//! needs it; there is no process-wide singleton.

use std::collections::HashMap;
use std::path::Path;

use crate::error::RpcError;

/// Default RPC server bind address.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8000";

/// Default coordination-service address.
pub const DEFAULT_DISCOVERY_ADDR: &str = "127.0.0.1:2181";

/// Key=value configuration with documented defaults.
///
/// Recognized keys: `rpcserver_ip`, `rpcserver_port`, `zookeeper_ip`,
/// `zookeeper_port`. Lines starting with `#` and lines without `=` are
/// ignored; keys and values are whitespace-trimmed.
#[derive(Debug, Clone, Default)]
pub struct RpcConfig {
    entries: HashMap<String, String>,
}

impl RpcConfig {
    /// Build a config from raw file contents.
    pub fn parse(contents: &str) -> Self {
        let mut entries = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        Self { entries }
    }

    /// Load a config file from disk.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Connect` wrapping the underlying I/O error if the
    /// file cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RpcError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::parse(&contents))
    }

    /// Look up a raw value by key.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn addr(&self, ip_key: &str, port_key: &str, default: &str) -> String {
        match (self.lookup(ip_key), self.lookup(port_key)) {
            (None, None) => default.to_string(),
            (ip, port) => {
                let (default_ip, default_port) =
                    default.split_once(':').unwrap_or((default, "0"));
                format!(
                    "{}:{}",
                    ip.unwrap_or(default_ip),
                    port.unwrap_or(default_port)
                )
            }
        }
    }

    /// The `ip:port` the RPC server binds, default `127.0.0.1:8000`.
    pub fn server_addr(&self) -> String {
        self.addr("rpcserver_ip", "rpcserver_port", DEFAULT_SERVER_ADDR)
    }

    /// The `ip:port` of the coordination service, default `127.0.0.1:2181`.
    pub fn discovery_addr(&self) -> String {
        self.addr("zookeeper_ip", "zookeeper_port", DEFAULT_DISCOVERY_ADDR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let config = RpcConfig::parse("rpcserver_ip=10.0.0.1\nrpcserver_port=9000\n");
        assert_eq!(config.lookup("rpcserver_ip"), Some("10.0.0.1"));
        assert_eq!(config.server_addr(), "10.0.0.1:9000");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let config = RpcConfig::parse("  zookeeper_ip =  192.168.1.5  \n");
        assert_eq!(config.lookup("zookeeper_ip"), Some("192.168.1.5"));
    }

    #[test]
    fn test_parse_skips_comments_and_garbage() {
        let config = RpcConfig::parse("# a comment\nnot a pair\n\nrpcserver_port=8001\n");
        assert_eq!(config.lookup("rpcserver_port"), Some("8001"));
        assert!(config.lookup("not a pair").is_none());
    }

    #[test]
    fn test_defaults_applied_when_absent() {
        let config = RpcConfig::parse("");
        assert_eq!(config.server_addr(), DEFAULT_SERVER_ADDR);
        assert_eq!(config.discovery_addr(), DEFAULT_DISCOVERY_ADDR);
    }

    #[test]
    fn test_partial_override_keeps_default_half() {
        let config = RpcConfig::parse("rpcserver_port=9999\n");
        assert_eq!(config.server_addr(), "127.0.0.1:9999");

        let config = RpcConfig::parse("zookeeper_ip=10.1.2.3\n");
        assert_eq!(config.discovery_addr(), "10.1.2.3:2181");
    }
}
