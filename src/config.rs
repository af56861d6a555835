// src/config.rs
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/pulse.toml";
pub const ENV_CONFIG_PATH: &str = "PULSE_CONFIG_PATH";

/// Namespace holding every `<name>IntervalSeconds` key.
pub const TIMER_NAMESPACE: &str = "timer";
pub const PUBLISH_INTERVAL_KEY: &str = "timer.publishIntervalSeconds";

/// Bounds for `chain.blockWindow`; the whole window goes out as one RPC batch.
pub const MIN_BLOCK_WINDOW: u64 = 2;
pub const MAX_BLOCK_WINDOW: u64 = 256;

/// Dotted-key lookup over whatever configuration the process was given.
pub trait ConfigSource: Send + Sync {
    fn get_str(&self, key: &str) -> Option<String>;

    fn get_u64(&self, key: &str) -> Option<u64> {
        self.get_str(key).and_then(|s| s.trim().parse().ok())
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// `timer.blockStatsIntervalSeconds` -> `TIMER_BLOCK_STATS_INTERVAL_SECONDS`
pub fn env_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 8);
    let mut prev_lower = false;
    for c in key.chars() {
        if c == '.' || c == '-' {
            out.push('_');
            prev_lower = false;
        } else if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c);
            prev_lower = false;
        } else {
            out.push(c.to_ascii_uppercase());
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// TOML tree with environment overrides (see [`env_key`]).
#[derive(Debug, Clone, Default)]
pub struct TomlConfigSource {
    root: toml::Table,
    env_override: bool,
}

impl TomlConfigSource {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let root: toml::Table = toml::from_str(s).context("parsing config toml")?;
        Ok(Self {
            root,
            env_override: true,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Ignore the process environment (tests).
    pub fn without_env(mut self) -> Self {
        self.env_override = false;
        self
    }

    fn lookup(&self, key: &str) -> Option<&toml::Value> {
        let mut parts = key.split('.');
        let mut cur = self.root.get(parts.next()?)?;
        for p in parts {
            cur = cur.as_table()?.get(p)?;
        }
        Some(cur)
    }
}

impl ConfigSource for TomlConfigSource {
    fn get_str(&self, key: &str) -> Option<String> {
        if self.env_override {
            if let Ok(v) = std::env::var(env_key(key)) {
                return Some(v);
            }
        }
        match self.lookup(key)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Load config using env var + fallback:
/// 1) $PULSE_CONFIG_PATH
/// 2) config/pulse.toml
/// 3) environment only
pub fn load_config_default() -> Result<TomlConfigSource> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        return TomlConfigSource::from_path(&pb);
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default.exists() {
        return TomlConfigSource::from_path(&default);
    }
    tracing::warn!("no config file found, using environment only");
    Ok(TomlConfigSource {
        root: toml::Table::new(),
        env_override: true,
    })
}

/// Settings the binary needs besides the per-task ingestion intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseConfig {
    pub validator_url: String,
    pub network: String,
    pub rpc_url: String,
    pub block_window: u64,
    pub store_path: String,
    pub publish_interval: Duration,
}

impl PulseConfig {
    pub fn from_source(src: &dyn ConfigSource) -> Result<Self> {
        let validator_url = src
            .get_str("validator.url")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("missing `validator.url`"))?;
        let rpc_url = src
            .get_str("chain.rpcUrl")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("missing `chain.rpcUrl`"))?;
        let publish_secs = src
            .get_u64(PUBLISH_INTERVAL_KEY)
            .filter(|s| *s > 0)
            .ok_or_else(|| anyhow!("`{PUBLISH_INTERVAL_KEY}` must be a positive number of seconds"))?;

        let block_window = match src.get_u64("chain.blockWindow") {
            Some(w) if !(MIN_BLOCK_WINDOW..=MAX_BLOCK_WINDOW).contains(&w) => {
                let clamped = w.clamp(MIN_BLOCK_WINDOW, MAX_BLOCK_WINDOW);
                tracing::warn!(requested = w, using = clamped, "`chain.blockWindow` out of range");
                clamped
            }
            Some(w) => w,
            None => 10,
        };

        Ok(Self {
            validator_url,
            network: src
                .get_str("validator.network")
                .unwrap_or_else(|| "testnet".to_string()),
            rpc_url,
            block_window,
            store_path: src
                .get_str("store.path")
                .unwrap_or_else(|| "data/pulse.db".to_string()),
            publish_interval: Duration::from_secs(publish_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[timer]
blockStatsIntervalSeconds = 15
validatorIntervalSeconds = 0
publishIntervalSeconds = 3

[validator]
url = "http://svc/validators/"

[chain]
rpcUrl = "http://node:8545"
"#;

    #[test]
    fn env_keys_are_screaming_snake() {
        assert_eq!(
            env_key("timer.blockStatsIntervalSeconds"),
            "TIMER_BLOCK_STATS_INTERVAL_SECONDS"
        );
        assert_eq!(env_key("validator.url"), "VALIDATOR_URL");
        assert_eq!(env_key("chain.rpcUrl"), "CHAIN_RPC_URL");
    }

    #[test]
    fn dotted_lookup_reads_nested_tables() {
        let src = TomlConfigSource::from_toml_str(SAMPLE).unwrap().without_env();
        assert_eq!(src.get_u64("timer.blockStatsIntervalSeconds"), Some(15));
        assert_eq!(src.get_u64("timer.validatorIntervalSeconds"), Some(0));
        assert_eq!(src.get_u64("timer.missingIntervalSeconds"), None);
        assert_eq!(src.get_str("validator.url").as_deref(), Some("http://svc/validators/"));
        assert_eq!(src.get_str("validator.url.deeper"), None);
    }

    #[test]
    fn pulse_config_applies_defaults() {
        let src = TomlConfigSource::from_toml_str(SAMPLE).unwrap().without_env();
        let cfg = PulseConfig::from_source(&src).unwrap();
        assert_eq!(cfg.network, "testnet");
        assert_eq!(cfg.block_window, 10);
        assert_eq!(cfg.store_path, "data/pulse.db");
        assert_eq!(cfg.publish_interval, Duration::from_secs(3));
    }

    #[test]
    fn zero_publish_interval_is_rejected() {
        let mut m = HashMap::new();
        m.insert("validator.url".to_string(), "http://a/".to_string());
        m.insert("chain.rpcUrl".to_string(), "http://b".to_string());
        m.insert(PUBLISH_INTERVAL_KEY.to_string(), "0".to_string());
        assert!(PulseConfig::from_source(&m).is_err());
    }

    #[test]
    fn block_window_is_clamped() {
        let mut m = HashMap::new();
        m.insert("validator.url".to_string(), "http://a/".to_string());
        m.insert("chain.rpcUrl".to_string(), "http://b".to_string());
        m.insert(PUBLISH_INTERVAL_KEY.to_string(), "3".to_string());

        for (given, expected) in [("1000000", MAX_BLOCK_WINDOW), ("0", MIN_BLOCK_WINDOW), ("25", 25)] {
            m.insert("chain.blockWindow".to_string(), given.to_string());
            assert_eq!(PulseConfig::from_source(&m).unwrap().block_window, expected);
        }
    }
}
