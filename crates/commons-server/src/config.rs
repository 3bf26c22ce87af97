use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub heartbeat: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = var("COMMONS_PORT", "3000")
            .parse()
            .context("COMMONS_PORT must be a port number")?;
        let heartbeat_secs: u64 = var("COMMONS_HEARTBEAT_SECS", "15")
            .parse()
            .context("COMMONS_HEARTBEAT_SECS must be a whole number of seconds")?;
        anyhow::ensure!(heartbeat_secs > 0, "COMMONS_HEARTBEAT_SECS must be positive");

        Ok(Self {
            jwt_secret: var("COMMONS_JWT_SECRET", "dev-secret-change-me"),
            db_path: PathBuf::from(var("COMMONS_DB_PATH", "commons.db")),
            host: var("COMMONS_HOST", "0.0.0.0"),
            port,
            heartbeat: Duration::from_secs(heartbeat_secs),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = from(&[]).unwrap();
        assert_eq!(config.jwt_secret, "dev-secret-change-me");
        assert_eq!(config.db_path, PathBuf::from("commons.db"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.heartbeat, Duration::from_secs(15));
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn overrides_and_bad_values() {
        let config = from(&[("COMMONS_PORT", "8080"), ("COMMONS_HOST", "127.0.0.1")]).unwrap();
        assert_eq!(config.addr().unwrap().to_string(), "127.0.0.1:8080");

        assert!(from(&[("COMMONS_PORT", "http")]).is_err());
        assert!(from(&[("COMMONS_HEARTBEAT_SECS", "0")]).is_err());
    }
}
