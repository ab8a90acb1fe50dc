use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::billing::types::UserId;
use crate::cache::CachePolicy;

/// Environment variable holding the billing API bearer token.
const TOKEN_ENV: &str = "CASHDASH_API_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// User whose dashboard is shown when none is given on the command line
  pub user_id: Option<UserId>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub ledger: LedgerConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the billing service; relative asset locators resolve against it
  pub url: Url,
  #[serde(default = "default_timeout", with = "humantime_serde")]
  pub timeout: Duration,
}

fn default_timeout() -> Duration {
  Duration::from_secs(10)
}

/// Cache windows per resource class.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  pub standard: CachePolicy,
  pub prefetch: CachePolicy,
  pub ledger: CachePolicy,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      standard: CachePolicy::standard(),
      prefetch: CachePolicy::prefetch(),
      ledger: CachePolicy::ledger(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
  pub page_size: u32,
}

impl Default for LedgerConfig {
  fn default() -> Self {
    Self { page_size: 10 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter used when RUST_LOG is not set
  pub level: String,
  /// Where log files go (defaults to the platform data directory)
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cashdash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cashdash/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/cashdash/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("cashdash.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cashdash").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.ledger.page_size == 0 {
      return Err(eyre!("ledger.page_size must be at least 1"));
    }
    for (name, policy) in [
      ("standard", &config.cache.standard),
      ("prefetch", &config.cache.prefetch),
      ("ledger", &config.cache.ledger),
    ] {
      if policy.stale_after > policy.retain_for {
        return Err(eyre!(
          "cache.{}: stale_after must not exceed retain_for",
          name
        ));
      }
    }

    Ok(config)
  }

  /// Get the billing API token from the environment, if set.
  pub fn get_api_token() -> Option<String> {
    std::env::var(TOKEN_ENV)
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("api:\n  url: https://cashback.example.com\n").unwrap();

    assert_eq!(config.api.url.as_str(), "https://cashback.example.com/");
    assert_eq!(config.api.timeout, Duration::from_secs(10));
    assert_eq!(config.user_id, None);
    assert_eq!(config.cache, CacheConfig::default());
    assert_eq!(config.ledger.page_size, 10);
    assert_eq!(config.log.level, "info");
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  url: https://cashback.example.com/
  timeout: 3s
user_id: 42
cache:
  ledger:
    stale_after: 10s
    retain_for: 1m
ledger:
  page_size: 25
log:
  level: cashdash=debug
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.api.timeout, Duration::from_secs(3));
    assert_eq!(config.user_id, Some(UserId(42)));
    assert_eq!(config.cache.ledger.stale_after, Duration::from_secs(10));
    assert_eq!(config.cache.ledger.retain_for, Duration::from_secs(60));
    assert_eq!(config.cache.standard, CachePolicy::standard());
    assert_eq!(config.ledger.page_size, 25);
    assert_eq!(config.log.level, "cashdash=debug");
  }

  #[test]
  fn test_invalid_configs_are_rejected() {
    assert!(Config::parse("api:\n  url: not a url\n").is_err());
    assert!(Config::parse("api:\n  url: https://x.test\nledger:\n  page_size: 0\n").is_err());

    let inverted = "api:\n  url: https://x.test\ncache:\n  standard:\n    stale_after: 10m\n    retain_for: 1m\n";
    assert!(Config::parse(inverted).is_err());
  }
}
