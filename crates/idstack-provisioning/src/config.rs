//! Platform Configuration
//!
//! Region and account are fixed for the lifetime of a client and passed in
//! explicitly. There is no ambient default instance.

use serde::{Deserialize, Serialize};

/// Default bucket scoped by the per-tenant user policy
pub const DEFAULT_STORAGE_BUCKET: &str = "idstack-tenant-data";

/// Region/account context of the identity platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Platform region, e.g. `eu-west-1`
    pub region: String,
    /// 12-digit account identifier
    pub account_id: String,
}

impl PlatformConfig {
    /// Create and validate a configuration
    pub fn new(region: impl Into<String>, account_id: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            region: region.into(),
            account_id: account_id.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Read `IDSTACK_REGION` (or `AWS_REGION`) and `IDSTACK_ACCOUNT_ID`
    pub fn from_env() -> Result<Self, ConfigError> {
        let region = std::env::var("IDSTACK_REGION")
            .or_else(|_| std::env::var("AWS_REGION"))
            .map_err(|_| ConfigError::Missing("IDSTACK_REGION"))?;
        let account_id = std::env::var("IDSTACK_ACCOUNT_ID")
            .map_err(|_| ConfigError::Missing("IDSTACK_ACCOUNT_ID"))?;
        Self::new(region, account_id)
    }

    /// Load from a JSON file
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check region and account id
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "region",
                reason: "must not be empty".into(),
            });
        }
        if self.account_id.len() != 12 || !self.account_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                field: "account_id",
                reason: format!("expected 12 digits, got {:?}", self.account_id),
            });
        }
        Ok(())
    }

    /// ARN of a user pool in this region/account
    pub fn user_pool_arn(&self, user_pool_id: &str) -> String {
        format!(
            "arn:aws:cognito-idp:{}:{}:userpool/{}",
            self.region, self.account_id, user_pool_id
        )
    }

    /// Provider name under which a user pool is registered with identity pools
    pub fn identity_provider_name(&self, user_pool_id: &str) -> String {
        format!("cognito-idp.{}.amazonaws.com/{}", self.region, user_pool_id)
    }
}

/// Knobs of the provisioning flow that are not platform context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Bucket whose `{tenant_id}/` prefix tenant users may access
    pub storage_bucket: String,
}

impl ProvisioningSettings {
    /// Settings with a custom storage bucket
    pub fn with_bucket(bucket: impl Into<String>) -> Self {
        Self {
            storage_bucket: bucket.into(),
        }
    }
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            storage_bucket: DEFAULT_STORAGE_BUCKET.into(),
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required setting absent
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    /// Setting present but malformed
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
    /// Config file could not be read
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Config file is not valid JSON
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_identifiers() {
        let config = PlatformConfig::new("eu-west-1", "964667303639").unwrap();
        assert_eq!(
            config.user_pool_arn("eu-west-1_abc"),
            "arn:aws:cognito-idp:eu-west-1:964667303639:userpool/eu-west-1_abc"
        );
        assert_eq!(
            config.identity_provider_name("eu-west-1_abc"),
            "cognito-idp.eu-west-1.amazonaws.com/eu-west-1_abc"
        );
    }

    #[test]
    fn test_provider_name_follows_region() {
        let config = PlatformConfig::new("us-east-2", "123456789012").unwrap();
        assert!(config.identity_provider_name("p").starts_with("cognito-idp.us-east-2."));
    }

    #[test]
    fn test_rejects_bad_account() {
        assert!(matches!(
            PlatformConfig::new("eu-west-1", "12ab"),
            Err(ConfigError::Invalid { field: "account_id", .. })
        ));
        assert!(matches!(
            PlatformConfig::new(" ", "123456789012"),
            Err(ConfigError::Invalid { field: "region", .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("idstack-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"region":"eu-west-1","account_id":"123456789012"}"#).unwrap();

        let config = PlatformConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.region, "eu-west-1");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_default_settings() {
        assert_eq!(ProvisioningSettings::default().storage_bucket, DEFAULT_STORAGE_BUCKET);
        assert_eq!(ProvisioningSettings::with_bucket("b").storage_bucket, "b");
    }
}
