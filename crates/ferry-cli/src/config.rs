//! Environment-based configuration (`FERRY_*`), loaded after `.env`.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, bail};

use ferry_lan::DEFAULT_PORT;
use ferry_transfer::{BLOCK_SIZE, MAX_BLOCK_SIZE, TracingLogger, TransferConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name announced to peers.
    pub device_name: String,
    pub port: u16,
    pub block_size: usize,
    /// Where received items are written.
    pub transfer_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device_name = lookup("FERRY_DEVICE_NAME")
            .or_else(|| lookup("HOSTNAME"))
            .unwrap_or_else(|| "ferry".into());
        let port = parse_var(&lookup, "FERRY_PORT", DEFAULT_PORT)?;
        let block_size = parse_var(&lookup, "FERRY_BLOCK_SIZE", BLOCK_SIZE)?;
        let transfer_dir = lookup("FERRY_TRANSFER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("received"));

        let config = Self {
            device_name,
            port,
            block_size,
            transfer_dir,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            bail!(
                "block size must be between 1 and {} bytes, got {}",
                MAX_BLOCK_SIZE,
                self.block_size
            );
        }
        if self.device_name.trim().is_empty() {
            bail!("device name must not be empty");
        }
        Ok(())
    }

    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            device_name: self.device_name.clone(),
            block_size: self.block_size,
            logger: Some(Arc::new(TracingLogger)),
            ..TransferConfig::default()
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {}: {:?}", key, value)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.device_name, "ferry");
        assert_eq!(config.port, 40818);
        assert_eq!(config.block_size, 65536);
        assert_eq!(config.transfer_dir, PathBuf::from("received"));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("HOSTNAME", "workstation"),
            ("FERRY_PORT", "5000"),
            ("FERRY_BLOCK_SIZE", "1024"),
            ("FERRY_TRANSFER_DIR", "/srv/inbox"),
        ])
        .unwrap();
        assert_eq!(config.device_name, "workstation");
        assert_eq!(config.port, 5000);
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.transfer_dir, PathBuf::from("/srv/inbox"));

        let named = self::config(&[("FERRY_DEVICE_NAME", "laptop"), ("HOSTNAME", "x")]);
        assert_eq!(named.unwrap().device_name, "laptop");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config(&[("FERRY_PORT", "http")]).is_err());
        assert!(config(&[("FERRY_BLOCK_SIZE", "0")]).is_err());
        assert!(config(&[("FERRY_BLOCK_SIZE", "8388608")]).is_err());
    }

    #[test]
    fn test_transfer_config() {
        let transfer = config(&[("FERRY_DEVICE_NAME", "laptop")])
            .unwrap()
            .transfer_config();
        assert_eq!(transfer.device_name, "laptop");
        assert_eq!(transfer.block_size, BLOCK_SIZE);
        assert!(transfer.logger.is_some());
    }
}
