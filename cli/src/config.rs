//! CLI Configuration
//!
//! Profiles live in `~/.idstack/config.toml` or `~/.idstack/config.<profile>.toml`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Keys accepted by `config set|get`
pub const KEYS: [&str; 4] = ["region", "account_id", "bucket", "default_format"];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub bucket: Option<String>,
    pub default_format: Option<String>,
}

impl Config {
    pub fn load(profile: Option<&str>) -> Result<Self> {
        Self::load_from(&Self::config_path(profile)?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, profile: Option<&str>) -> Result<PathBuf> {
        let path = Self::config_path(profile)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: String) -> Result<()> {
        *self.slot(key)? = Some(value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<&str>> {
        let value = match key {
            "region" => &self.region,
            "account_id" => &self.account_id,
            "bucket" => &self.bucket,
            "default_format" => &self.default_format,
            _ => bail!("Unknown config key: {key}"),
        };
        Ok(value.as_deref())
    }

    fn slot(&mut self, key: &str) -> Result<&mut Option<String>> {
        Ok(match key {
            "region" => &mut self.region,
            "account_id" => &mut self.account_id,
            "bucket" => &mut self.bucket,
            "default_format" => &mut self.default_format,
            _ => bail!("Unknown config key: {key}"),
        })
    }

    pub fn config_path(profile: Option<&str>) -> Result<PathBuf> {
        let home = dirs::home_dir().context("Cannot find home directory")?;
        let filename = match profile {
            Some(p) => format!("config.{}.toml", p),
            None => "config.toml".to_string(),
        };
        Ok(home.join(".idstack").join(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();
        config.set("region", "eu-west-1".into()).unwrap();

        assert_eq!(config.get("region").unwrap(), Some("eu-west-1"));
        assert_eq!(config.get("bucket").unwrap(), None);
        assert!(config.set("api_key", "x".into()).is_err());
        assert!(config.get("api_key").is_err());
    }

    #[test]
    fn test_every_key_is_settable() {
        let mut config = Config::default();
        for key in KEYS {
            config.set(key, format!("{key}-value")).unwrap();
            assert_eq!(config.get(key).unwrap(), Some(format!("{key}-value").as_str()));
        }
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("idstack-cli-{}", uuid::Uuid::new_v4()))
            .join("config.toml");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        let config = Config {
            region: Some("eu-west-1".into()),
            account_id: Some("123456789012".into()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
