use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use crate::error::{PopError, Result};

/// Top-level configuration, loaded from an optional TOML file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// HTTP listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Pool directory configuration.
    #[serde(default)]
    pub pool: PoolConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), port: default_port() }
    }
}

/// Where the pooled files live.
#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    /// Root of the served directory tree. Every logical path is relative to it.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { root: default_root() }
    }
}

fn default_bind() -> IpAddr { IpAddr::V4(Ipv4Addr::UNSPECIFIED) }
fn default_port() -> u16 { 8666 }
fn default_root() -> PathBuf { PathBuf::from(".") }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PopError::Config(format!("Cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text. Missing sections take defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PopError::Config(format!("Invalid TOML: {e}")))
    }

    /// Load from `path` when given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    pub fn validate(&self) -> Result<()> {
        let root = &self.pool.root;
        match std::fs::metadata(root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(PopError::Config(format!("pool root {root:?} is not a directory"))),
            Err(e) => Err(PopError::Config(format!("pool root {root:?}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_takes_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.server.port, 8666);
        assert_eq!(cfg.pool.root, PathBuf::from("."));
        assert_eq!(cfg.listen_addr().to_string(), "0.0.0.0:8666");
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = Config::from_toml(
            r#"
            [server]
            bind = "127.0.0.1"
            port = 9000

            [pool]
            root = "/srv/outbox"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.listen_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.pool.root, PathBuf::from("/srv/outbox"));
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(Config::from_toml("[server"), Err(PopError::Config(_))));
    }

    #[test]
    fn validate_rejects_missing_root() {
        let mut cfg = Config::default();
        cfg.pool.root = PathBuf::from("/definitely/not/a/pool/root");
        assert!(matches!(cfg.validate(), Err(PopError::Config(_))));
    }
}
